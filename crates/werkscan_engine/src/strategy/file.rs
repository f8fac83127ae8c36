//! Still-image fallback.
//!
//! Works even without a live camera permission model: the host presents its
//! capture/selection surface, each supplied image gets one single-shot
//! decode, and decode failures are reported per-attempt so the user can try
//! another image. The only strategy where "transient" means
//! retry-by-user-action rather than automatic retry.

use super::{usable_text, ScanStrategy, Strategy, StrategyContext, StrategyOutcome};
use crate::capability::Capabilities;
use crate::error::{classify, ErrorKind, ScanError};
use crate::session::SessionState;
use async_trait::async_trait;
use tracing::debug;

pub struct FileFallbackStrategy;

#[async_trait]
impl ScanStrategy for FileFallbackStrategy {
    fn id(&self) -> Strategy {
        Strategy::FileFallback
    }

    fn available(&self, _caps: &Capabilities) -> bool {
        true
    }

    async fn run(&self, cx: &StrategyContext) -> StrategyOutcome {
        let loaded = tokio::select! {
            biased;
            _ = cx.gate.wait() => return StrategyOutcome::Closed,
            res = cx.loader.load() => res,
        };
        let engine = match loaded {
            Ok(engine) => engine,
            Err(err) => {
                return StrategyOutcome::Failed(ScanError::new(
                    ErrorKind::LibraryLoadFailure,
                    err.to_string(),
                    Strategy::FileFallback,
                ));
            }
        };

        // No persistent stream to acquire; the streaming transition is a
        // pass-through.
        cx.set_state(SessionState::Streaming);
        cx.set_state(SessionState::Detecting);

        loop {
            if cx.gate.is_settled() {
                return StrategyOutcome::Closed;
            }
            let supplied = tokio::select! {
                biased;
                _ = cx.gate.wait() => return StrategyOutcome::Closed,
                res = cx.platform.acquire_still_image() => res,
            };
            let image = match supplied {
                Ok(Some(image)) => image,
                Ok(None) => {
                    debug!("still-image surface dismissed");
                    return StrategyOutcome::Closed;
                }
                Err(raw) => {
                    return StrategyOutcome::Failed(classify(&raw, Strategy::FileFallback));
                }
            };
            if cx.gate.is_settled() {
                return StrategyOutcome::Closed;
            }
            let decoded = tokio::select! {
                biased;
                _ = cx.gate.wait() => return StrategyOutcome::Closed,
                res = engine.decode_image(&image) => res,
            };
            if cx.gate.is_settled() {
                return StrategyOutcome::Closed;
            }
            match decoded {
                Ok(Some(text)) => {
                    if let Some(value) = usable_text(&text) {
                        return StrategyOutcome::Detected(value);
                    }
                    cx.attempt_error(ScanError::new(
                        ErrorKind::TransientDecodeFailure,
                        "no code found in the supplied image",
                        Strategy::FileFallback,
                    ));
                }
                Ok(None) => {
                    cx.attempt_error(ScanError::new(
                        ErrorKind::TransientDecodeFailure,
                        "no code found in the supplied image",
                        Strategy::FileFallback,
                    ));
                }
                Err(raw) => {
                    cx.attempt_error(ScanError::new(
                        ErrorKind::TransientDecodeFailure,
                        raw.message.clone(),
                        Strategy::FileFallback,
                    ));
                }
            }
        }
    }
}
