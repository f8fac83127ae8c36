//! Native platform decode over a live stream.

use super::{usable_text, ScanStrategy, Strategy, StrategyContext, StrategyOutcome};
use crate::capability::{choose_device, Capabilities};
use crate::error::{classify, ErrorKind, ScanError};
use crate::platform::StreamRequest;
use crate::session::{SessionEvent, SessionState};
use async_trait::async_trait;
use tracing::warn;

/// Rear-biased live stream inspected by the platform's own detector at the
/// stream's frame cadence. First non-empty trimmed decode wins.
pub struct NativeDetectorStrategy;

#[async_trait]
impl ScanStrategy for NativeDetectorStrategy {
    fn id(&self) -> Strategy {
        Strategy::NativeDetector
    }

    fn available(&self, caps: &Capabilities) -> bool {
        caps.has_native_decoder && caps.has_media_stream
    }

    async fn run(&self, cx: &StrategyContext) -> StrategyOutcome {
        let Some(detector) = cx.platform.native_detector() else {
            return StrategyOutcome::Failed(ScanError::new(
                ErrorKind::Unsupported,
                "native detector advertised but not constructible",
                Strategy::NativeDetector,
            ));
        };

        let request = match choose_device(cx.platform.as_ref(), &cx.caps).await {
            Some(device) => StreamRequest {
                device_id: Some(device.id),
                facing: device.facing,
            },
            None => StreamRequest {
                device_id: None,
                facing: cx.config.fallback_facing,
            },
        };

        let opened = tokio::select! {
            biased;
            _ = cx.gate.wait() => return StrategyOutcome::Closed,
            res = cx.platform.open_stream(&request) => res,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(raw) => {
                return StrategyOutcome::Failed(classify(&raw, Strategy::NativeDetector));
            }
        };
        if cx.gate.is_settled() {
            stream.release();
            return StrategyOutcome::Closed;
        }
        cx.set_state(SessionState::Streaming);
        cx.emit(SessionEvent::Streaming {
            strategy: Strategy::NativeDetector,
        });
        cx.set_state(SessionState::Detecting);

        let mut consecutive_raises: u32 = 0;
        let outcome = loop {
            if cx.gate.is_settled() {
                break StrategyOutcome::Closed;
            }
            let frame = tokio::select! {
                biased;
                _ = cx.gate.wait() => break StrategyOutcome::Closed,
                res = stream.next_frame() => res,
            };
            let frame = match frame {
                Ok(frame) => frame,
                Err(raw) => {
                    // Stream loss is an operation failure, not frame noise.
                    break StrategyOutcome::Failed(classify(&raw, Strategy::NativeDetector));
                }
            };
            if cx.gate.is_settled() {
                // Frame resolved after close; discard it.
                break StrategyOutcome::Closed;
            }
            let detected = tokio::select! {
                biased;
                _ = cx.gate.wait() => break StrategyOutcome::Closed,
                res = detector.detect(&frame) => res,
            };
            if cx.gate.is_settled() {
                break StrategyOutcome::Closed;
            }
            match detected {
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
                        break StrategyOutcome::Failed(classify(&raw, Strategy::NativeDetector));
                    }
                    warn!(error = %raw, tolerated = consecutive_raises, "suppressed frame inspection error");
                    cx.emit(SessionEvent::SuppressedError {
                        strategy: Strategy::NativeDetector,
                        message: raw.to_string(),
                    });
                }
            }
        };
        stream.release();
        outcome
    }
}
