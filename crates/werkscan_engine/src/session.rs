//! Scan session orchestration.
//!
//! Design principles:
//! - One session task per open attempt; the camera stream is exclusively
//!   owned by that task and released on every exit path.
//! - At most one terminal callback per attempt, enforced by the settle gate.
//! - `open_scan` while a prior session is live fully closes it (signal and
//!   await) before the new session acquires anything — never two streams.
//! - `close()` is idempotent and safe after natural termination.

use crate::capability::Capabilities;
use crate::config::ScanConfig;
use crate::error::{decide, Decision, ErrorKind, ScanError};
use crate::gate::SessionGate;
use crate::loader::DecoderLoader;
use crate::platform::{CameraPlatform, DecoderFetch};
use crate::strategy::{self, ScanStrategy, Strategy, StrategyContext, StrategyOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ============================================================================
// Session data model
// ============================================================================

/// The one value a successful session produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Decoded text, trimmed and non-empty.
    pub value: String,
    /// The strategy that produced it.
    pub source: Strategy,
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Acquiring,
    Streaming,
    Detecting,
    Succeeded,
    Failed,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Acquiring => "acquiring",
            SessionState::Streaming => "streaming",
            SessionState::Detecting => "detecting",
            SessionState::Succeeded => "succeeded",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Succeeded | SessionState::Failed | SessionState::Closed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the session task ended. Mirrors the terminal callback that fired (or
/// did not, for Closed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Detected(ScanResult),
    Failed(ScanError),
    Closed,
}

/// Diagnostic trace of one session, consumed by the replay harness.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Probed { capabilities: Capabilities },
    StrategySelected { strategy: Strategy },
    Streaming { strategy: Strategy },
    SuppressedError { strategy: Strategy, message: String },
    FallingBack { strategy: Strategy, kind: ErrorKind },
    AttemptError { error: ScanError },
}

/// Optional observer for [`SessionEvent`]s. Cheap to clone.
#[derive(Clone, Default)]
pub struct EventSink(Option<Arc<dyn Fn(&SessionEvent) + Send + Sync>>);

impl EventSink {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new(observer: impl Fn(&SessionEvent) + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(observer)))
    }

    pub fn emit(&self, event: &SessionEvent) {
        if let Some(observer) = &self.0 {
            observer(event);
        }
    }
}

/// Callbacks the UI layer hands to `open_scan`.
///
/// `on_detected` and a surfaced `on_error` are mutually exclusive and fire at
/// most once; `on_close` fires exactly once after resources are released, on
/// every terminal path. `on_error` additionally carries the non-terminal
/// per-attempt failures of the still-image fallback.
pub struct ScanCallbacks {
    pub(crate) on_detected: Box<dyn Fn(ScanResult) + Send + Sync>,
    pub(crate) on_close: Box<dyn Fn() + Send + Sync>,
    pub(crate) on_error: Option<Box<dyn Fn(&ScanError) + Send + Sync>>,
}

impl ScanCallbacks {
    pub fn new(
        on_detected: impl Fn(ScanResult) + Send + Sync + 'static,
        on_close: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_detected: Box::new(on_detected),
            on_close: Box::new(on_close),
            on_error: None,
        }
    }

    pub fn with_error(mut self, on_error: impl Fn(&ScanError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }
}

/// Publishes state transitions to the handle and the log.
#[derive(Debug)]
pub struct StateSender {
    tx: watch::Sender<SessionState>,
}

impl StateSender {
    pub(crate) fn new(tx: watch::Sender<SessionState>) -> Self {
        Self { tx }
    }

    pub(crate) fn set(&self, next: SessionState) {
        let prev = self.tx.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "session state");
        }
    }
}

// ============================================================================
// Scanner and session handle
// ============================================================================

/// Handle for one open scan attempt. Clone is cheap and shares the session.
#[derive(Clone)]
pub struct SessionHandle {
    gate: SessionGate,
    state: watch::Receiver<SessionState>,
    task: Arc<Mutex<Option<JoinHandle<SessionOutcome>>>>,
}

impl SessionHandle {
    /// Request close. Idempotent; safe to call multiple times and after
    /// natural termination. No callbacks fire as a consequence of a close
    /// that lost the race to a terminal outcome.
    pub fn close(&self) {
        self.gate.close();
    }

    /// True once the session has produced its terminal outcome or was closed.
    pub fn is_settled(&self) -> bool {
        self.gate.is_settled()
    }

    /// Last published lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Await the session task. Returns `None` if someone already joined it.
    pub async fn join(&self) -> Option<SessionOutcome> {
        let task = self.task.lock().await.take();
        match task {
            Some(task) => task.await.ok(),
            None => None,
        }
    }

    /// Close and wait until the task has finished and released resources.
    pub async fn shutdown(&self) -> Option<SessionOutcome> {
        self.gate.close();
        self.join().await
    }
}

/// Front door for the UI layer. Owns the platform seam, the decoder loader
/// and the currently-open session.
pub struct Scanner {
    platform: Arc<dyn CameraPlatform>,
    loader: Arc<DecoderLoader>,
    config: ScanConfig,
    active: Mutex<Option<SessionHandle>>,
}

impl Scanner {
    pub fn new(
        platform: Arc<dyn CameraPlatform>,
        fetch: Arc<dyn DecoderFetch>,
        config: ScanConfig,
    ) -> Self {
        Self::with_loader(platform, Arc::new(DecoderLoader::new(fetch)), config)
    }

    pub fn with_loader(
        platform: Arc<dyn CameraPlatform>,
        loader: Arc<DecoderLoader>,
        config: ScanConfig,
    ) -> Self {
        Self {
            platform,
            loader,
            config,
            active: Mutex::new(None),
        }
    }

    /// The shared decoder loader (memoized engine handle; `reset()` is
    /// injectable state for tests).
    pub fn loader(&self) -> &Arc<DecoderLoader> {
        &self.loader
    }

    /// Open one scan attempt. Any prior live session is fully closed — its
    /// stream released — before the new one acquires anything.
    pub async fn open_scan(&self, callbacks: ScanCallbacks) -> SessionHandle {
        self.open_scan_with_events(callbacks, EventSink::none())
            .await
    }

    pub async fn open_scan_with_events(
        &self,
        callbacks: ScanCallbacks,
        events: EventSink,
    ) -> SessionHandle {
        let mut active = self.active.lock().await;
        if let Some(prev) = active.take() {
            if !prev.is_settled() {
                info!("closing prior scan session before opening a new one");
            }
            prev.shutdown().await;
        }

        let gate = SessionGate::new();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let task = tokio::spawn(run_session(
            self.platform.clone(),
            self.loader.clone(),
            self.config.clone(),
            gate.clone(),
            StateSender::new(state_tx),
            events,
            Arc::new(callbacks),
        ));
        let handle = SessionHandle {
            gate,
            state: state_rx,
            task: Arc::new(Mutex::new(Some(task))),
        };
        *active = Some(handle.clone());
        handle
    }
}

// ============================================================================
// Session task
// ============================================================================

enum ChainEnd {
    Detected { value: String, source: Strategy },
    Failed(ScanError),
    Closed,
}

async fn run_session(
    platform: Arc<dyn CameraPlatform>,
    loader: Arc<DecoderLoader>,
    config: ScanConfig,
    gate: SessionGate,
    state: StateSender,
    events: EventSink,
    callbacks: Arc<ScanCallbacks>,
) -> SessionOutcome {
    state.set(SessionState::Acquiring);
    let caps = Capabilities::probe(platform.as_ref());
    events.emit(&SessionEvent::Probed { capabilities: caps });

    let strategies = strategy::select(strategy::chain(), &caps);
    let cx = StrategyContext {
        platform,
        loader,
        config,
        caps,
        gate,
        state,
        events,
        callbacks,
    };

    let end = drive_chain(&cx, &strategies).await;
    finish(&cx, end)
}

async fn drive_chain(cx: &StrategyContext, strategies: &[Box<dyn ScanStrategy>]) -> ChainEnd {
    if strategies.is_empty() {
        return ChainEnd::Failed(ScanError::new(
            ErrorKind::Unsupported,
            "no scan strategy is available in this environment",
            Strategy::FileFallback,
        ));
    }

    let mut last_error: Option<ScanError> = None;
    for strat in strategies {
        if cx.gate.is_settled() {
            return ChainEnd::Closed;
        }
        let mut retried = false;
        loop {
            info!(strategy = %strat.id(), "starting scan strategy");
            cx.emit(SessionEvent::StrategySelected {
                strategy: strat.id(),
            });
            match strat.run(cx).await {
                StrategyOutcome::Detected(value) => {
                    return ChainEnd::Detected {
                        value,
                        source: strat.id(),
                    };
                }
                StrategyOutcome::Closed => return ChainEnd::Closed,
                StrategyOutcome::Failed(error) => match decide(&error) {
                    Decision::Surface => return ChainEnd::Failed(error),
                    Decision::Fallback => {
                        warn!(error = %error, "strategy failed; falling back");
                        cx.emit(SessionEvent::FallingBack {
                            strategy: strat.id(),
                            kind: error.kind,
                        });
                        last_error = Some(error);
                        break;
                    }
                    Decision::Retry => {
                        // Strategies retry transient failures internally; a
                        // second top-level transient means this strategy is
                        // not converging.
                        if retried {
                            warn!(error = %error, "strategy kept failing transiently; falling back");
                            cx.emit(SessionEvent::FallingBack {
                                strategy: strat.id(),
                                kind: error.kind,
                            });
                            last_error = Some(error);
                            break;
                        }
                        retried = true;
                        debug!(error = %error, "retrying strategy after transient failure");
                    }
                },
            }
        }
    }

    let message = match last_error {
        Some(error) => format!("all scan strategies exhausted; last error: {}", error),
        None => "all scan strategies exhausted".to_string(),
    };
    ChainEnd::Failed(ScanError::new(
        ErrorKind::Unsupported,
        message,
        Strategy::FileFallback,
    ))
}

/// Claim the terminal outcome and fire callbacks. The gate decides between
/// the session's own outcome and a racing `close()`; the loser is silent.
fn finish(cx: &StrategyContext, end: ChainEnd) -> SessionOutcome {
    let outcome = match end {
        ChainEnd::Detected { value, source } => {
            if cx.gate.try_settle() {
                let result = ScanResult { value, source };
                cx.set_state(SessionState::Succeeded);
                info!(source = %result.source, "scan succeeded");
                (cx.callbacks.on_detected)(result.clone());
                SessionOutcome::Detected(result)
            } else {
                SessionOutcome::Closed
            }
        }
        ChainEnd::Failed(error) => {
            if cx.gate.try_settle() {
                cx.set_state(SessionState::Failed);
                warn!(error = %error, "scan failed");
                if let Some(on_error) = &cx.callbacks.on_error {
                    on_error(&error);
                }
                SessionOutcome::Failed(error)
            } else {
                SessionOutcome::Closed
            }
        }
        ChainEnd::Closed => SessionOutcome::Closed,
    };

    if outcome == SessionOutcome::Closed {
        cx.gate.close();
        cx.set_state(SessionState::Closed);
        debug!("scan session closed");
    }
    (cx.callbacks.on_close)();
    outcome
}
