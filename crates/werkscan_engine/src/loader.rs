//! External decoder engine loader.
//!
//! The engine asset is acquired at most once per process under normal
//! operation: the first caller fetches, concurrent callers share the pending
//! outcome, later callers get the memoized handle. A failed fetch clears the
//! memo — a transient network failure must not permanently disable the
//! fallback path. `reset()` is injectable state for tests.

use crate::platform::{DecoderEngine, DecoderFetch};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

/// Engine acquisition failure. Cloneable so concurrent callers can share the
/// same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decoder load failed: {0}")]
pub struct LoadError(pub String);

type LoadOutcome = Result<Arc<dyn DecoderEngine>, LoadError>;

enum LoadState {
    Idle,
    Loading(watch::Receiver<Option<LoadOutcome>>),
    Ready(Arc<dyn DecoderEngine>),
}

pub struct DecoderLoader {
    fetch: Arc<dyn DecoderFetch>,
    state: Mutex<LoadState>,
}

impl DecoderLoader {
    pub fn new(fetch: Arc<dyn DecoderFetch>) -> Self {
        Self {
            fetch,
            state: Mutex::new(LoadState::Idle),
        }
    }

    /// Obtain the engine, fetching it on the first call. Concurrent callers
    /// receive the same pending/resolved outcome.
    pub async fn load(&self) -> LoadOutcome {
        let tx = {
            let mut state = self.state.lock().await;
            match &*state {
                LoadState::Ready(engine) => return Ok(engine.clone()),
                LoadState::Loading(rx) => {
                    let rx = rx.clone();
                    drop(state);
                    return self.await_outcome(rx).await;
                }
                LoadState::Idle => {}
            }
            let (tx, rx) = watch::channel(None);
            *state = LoadState::Loading(rx);
            tx
        };

        debug!("fetching external decoder engine");
        let outcome: LoadOutcome = match self.fetch.fetch().await {
            Ok(engine) => Ok(engine),
            Err(err) => Err(LoadError(err.to_string())),
        };

        {
            let mut state = self.state.lock().await;
            match &outcome {
                Ok(engine) => *state = LoadState::Ready(engine.clone()),
                Err(err) => {
                    // Failure clears the memo so the next call re-attempts.
                    warn!(error = %err, "decoder engine fetch failed");
                    *state = LoadState::Idle;
                }
            }
        }
        let _ = tx.send(Some(outcome.clone()));
        outcome
    }

    /// Drop any memoized engine or outcome. The next `load()` fetches anew.
    pub async fn reset(&self) {
        *self.state.lock().await = LoadState::Idle;
    }

    async fn await_outcome(&self, mut rx: watch::Receiver<Option<LoadOutcome>>) -> LoadOutcome {
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // The fetching caller was cancelled before publishing; clear
                // the memo so a later call re-attempts.
                let mut state = self.state.lock().await;
                if matches!(&*state, LoadState::Loading(cur) if cur.same_channel(&rx)) {
                    *state = LoadState::Idle;
                }
                return Err(LoadError("decoder load interrupted".to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{
        CameraSourceDescriptor, ImageData, LiveDecodeOptions, LiveDecoder, PlatformError,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct NullEngine;

    #[async_trait]
    impl DecoderEngine for NullEngine {
        async fn start_live(
            &self,
            _source: &CameraSourceDescriptor,
            _options: &LiveDecodeOptions,
        ) -> Result<Box<dyn LiveDecoder>, PlatformError> {
            Err(PlatformError::new("NotSupportedError", "null engine"))
        }

        async fn decode_image(
            &self,
            _image: &ImageData,
        ) -> Result<Option<String>, PlatformError> {
            Ok(None)
        }
    }

    /// Fetch with a scripted outcome per call and an attempt counter.
    struct ScriptFetch {
        outcomes: Mutex<Vec<Result<(), String>>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptFetch {
        fn new(outcomes: Vec<Result<(), String>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
                delay: None,
            })
        }

        fn with_delay(outcomes: Vec<Result<(), String>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
                delay: Some(delay),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DecoderFetch for ScriptFetch {
        async fn fetch(&self) -> Result<Arc<dyn DecoderEngine>, PlatformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.outcomes.lock().await.pop();
            match next {
                Some(Ok(())) | None => Ok(Arc::new(NullEngine)),
                Some(Err(message)) => Err(PlatformError::new("NetworkError", message)),
            }
        }
    }

    #[tokio::test]
    async fn second_load_reuses_memoized_engine() {
        let fetch = ScriptFetch::new(vec![Ok(())]);
        let loader = DecoderLoader::new(fetch.clone());

        assert!(loader.load().await.is_ok());
        assert!(loader.load().await.is_ok());
        assert_eq!(fetch.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_fetch() {
        let fetch = ScriptFetch::with_delay(vec![Ok(())], Duration::from_millis(20));
        let loader = Arc::new(DecoderLoader::new(fetch.clone()));

        let a = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load().await })
        };
        let b = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load().await })
        };

        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
        assert_eq!(fetch.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_failure() {
        // Outcomes pop from the back: both concurrent callers see the single
        // failed attempt, and no second fetch starts behind their backs.
        let fetch =
            ScriptFetch::with_delay(vec![Err("asset 404".to_string())], Duration::from_millis(20));
        let loader = Arc::new(DecoderLoader::new(fetch.clone()));

        let a = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load().await })
        };
        let b = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load().await })
        };

        assert!(a.await.unwrap().is_err());
        assert!(b.await.unwrap().is_err());
        assert_eq!(fetch.calls(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_clears_memo_and_retries() {
        let fetch = ScriptFetch::new(vec![Ok(()), Err("flaky network".to_string())]);
        let loader = DecoderLoader::new(fetch.clone());

        let first = loader.load().await;
        assert_eq!(
            first.unwrap_err(),
            LoadError("NetworkError: flaky network".to_string())
        );

        let second = loader.load().await;
        assert!(second.is_ok());
        assert_eq!(fetch.calls(), 2);
    }

    #[tokio::test]
    async fn reset_forces_a_fresh_fetch() {
        let fetch = ScriptFetch::new(vec![Ok(()), Ok(())]);
        let loader = DecoderLoader::new(fetch.clone());

        assert!(loader.load().await.is_ok());
        loader.reset().await;
        assert!(loader.load().await.is_ok());
        assert_eq!(fetch.calls(), 2);
    }
}
