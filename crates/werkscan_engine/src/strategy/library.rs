//! Live decode driven by the external engine.

use super::{usable_text, ScanStrategy, Strategy, StrategyContext, StrategyOutcome};
use crate::capability::{choose_device, Capabilities};
use crate::error::{classify, ErrorKind, ScanError};
use crate::platform::{CameraSourceDescriptor, LiveDecodeOptions, PlatformError};
use crate::session::{SessionEvent, SessionState};
use async_trait::async_trait;
use tracing::warn;

/// The external engine drives the camera itself; the session polls it
/// cooperatively. Per-frame "not found" is the normal case and is ignored —
/// continuous scanning produces it on most frames by design.
pub struct LibraryDetectorStrategy;

#[async_trait]
impl ScanStrategy for LibraryDetectorStrategy {
    fn id(&self) -> Strategy {
        Strategy::LibraryDetector
    }

    fn available(&self, caps: &Capabilities) -> bool {
        caps.has_media_stream
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
                    Strategy::LibraryDetector,
                ));
            }
        };
        if cx.gate.is_settled() {
            return StrategyOutcome::Closed;
        }

        let source = match choose_device(cx.platform.as_ref(), &cx.caps).await {
            Some(device) => CameraSourceDescriptor::Device { id: device.id },
            None => CameraSourceDescriptor::Facing(cx.config.fallback_facing),
        };
        let options = LiveDecodeOptions {
            fps: cx.config.fps,
            scan_box: cx.config.scan_box,
        };

        let started = tokio::select! {
            biased;
            _ = cx.gate.wait() => return StrategyOutcome::Closed,
            res = engine.start_live(&source, &options) => res,
        };
        let mut live = match started {
            Ok(live) => live,
            Err(raw) => {
                return StrategyOutcome::Failed(classify(&raw, Strategy::LibraryDetector));
            }
        };
        if cx.gate.is_settled() {
            live.stop();
            return StrategyOutcome::Closed;
        }
        cx.set_state(SessionState::Streaming);
        cx.emit(SessionEvent::Streaming {
            strategy: Strategy::LibraryDetector,
        });
        cx.set_state(SessionState::Detecting);

        let stall = cx.config.stall_timeout();
        let mut consecutive_raises: u32 = 0;
        let outcome = loop {
            if cx.gate.is_settled() {
                break StrategyOutcome::Closed;
            }
            let poll = async {
                match stall {
                    Some(window) => match tokio::time::timeout(window, live.poll_decode()).await {
                        Ok(res) => res,
                        Err(_) => Err(PlatformError::new(
                            "NotSupportedError",
                            "live decode produced nothing within the stall window",
                        )),
                    },
                    None => live.poll_decode().await,
                }
            };
            let polled = tokio::select! {
                biased;
                _ = cx.gate.wait() => break StrategyOutcome::Closed,
                res = poll => res,
            };
            if cx.gate.is_settled() {
                // Completion resolved after close; discard it.
                break StrategyOutcome::Closed;
            }
            match polled {
                Ok(Some(text)) => {
                    if let Some(value) = usable_text(&text) {
                        break StrategyOutcome::Detected(value);
                    }
                    consecutive_raises = 0;
                }
                Ok(None) => {
                    consecutive_raises = 0;
                }
                Err(raw) => {
                    consecutive_raises += 1;
                    if consecutive_raises > cx.config.frame_error_tolerance {
                        break StrategyOutcome::Failed(classify(&raw, Strategy::LibraryDetector));
                    }
                    warn!(error = %raw, tolerated = consecutive_raises, "suppressed live decode error");
                    cx.emit(SessionEvent::SuppressedError {
                        strategy: Strategy::LibraryDetector,
                        message: raw.to_string(),
                    });
                }
            }
        };
        live.stop();
        outcome
    }
}
