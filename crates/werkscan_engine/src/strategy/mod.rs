//! Scan strategies and the fixed fallback chain.
//!
//! A strategy is one concrete method of obtaining a decoded code. The chain
//! order is fixed and IS the fallback order: native platform decode, then
//! the external engine, then the still-image fallback.

mod file;
mod library;
mod native;

pub use file::FileFallbackStrategy;
pub use library::LibraryDetectorStrategy;
pub use native::NativeDetectorStrategy;

use crate::capability::Capabilities;
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::gate::SessionGate;
use crate::loader::DecoderLoader;
use crate::platform::CameraPlatform;
use crate::session::{EventSink, ScanCallbacks, SessionEvent, SessionState, StateSender};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Strategy identity, in fallback-chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    NativeDetector,
    LibraryDetector,
    FileFallback,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::NativeDetector => "native_detector",
            Strategy::LibraryDetector => "library_detector",
            Strategy::FileFallback => "file_fallback",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native_detector" => Ok(Strategy::NativeDetector),
            "library_detector" => Ok(Strategy::LibraryDetector),
            "file_fallback" => Ok(Strategy::FileFallback),
            _ => Err(format!(
                "Invalid strategy: '{}'. Expected: native_detector, library_detector, or file_fallback",
                s
            )),
        }
    }
}

/// How one strategy run ended.
#[derive(Debug)]
pub enum StrategyOutcome {
    /// A non-empty, trimmed decode. The session settles on it immediately.
    Detected(String),
    /// An operation failure, already classified. The session applies the
    /// retry/fallback/surface decision.
    Failed(ScanError),
    /// The gate settled (or the user dismissed the fallback surface) while
    /// the strategy was running. Nothing to report.
    Closed,
}

/// Everything a strategy needs to run one attempt. Owned by the session
/// task; strategies borrow it.
pub struct StrategyContext {
    pub platform: Arc<dyn CameraPlatform>,
    pub loader: Arc<DecoderLoader>,
    pub config: ScanConfig,
    pub caps: Capabilities,
    pub gate: SessionGate,
    pub state: StateSender,
    pub events: EventSink,
    pub callbacks: Arc<ScanCallbacks>,
}

impl StrategyContext {
    pub fn set_state(&self, next: SessionState) {
        self.state.set(next);
    }

    pub fn emit(&self, event: SessionEvent) {
        self.events.emit(&event);
    }

    /// Report a non-terminal, per-attempt error (FileFallback retries by
    /// user action). Suppressed once the gate has settled.
    pub fn attempt_error(&self, error: ScanError) {
        if self.gate.is_settled() {
            return;
        }
        debug!(error = %error, "per-attempt scan error");
        self.emit(SessionEvent::AttemptError {
            error: error.clone(),
        });
        if let Some(on_error) = &self.callbacks.on_error {
            on_error(&error);
        }
    }
}

#[async_trait]
pub trait ScanStrategy: Send + Sync {
    fn id(&self) -> Strategy;

    /// Preconditions against the probed capabilities.
    fn available(&self, caps: &Capabilities) -> bool;

    /// Drive this strategy to completion. Implementations must release any
    /// acquired stream/decoder on every exit path and poll the gate at every
    /// loop iteration and after every resumed await.
    async fn run(&self, cx: &StrategyContext) -> StrategyOutcome;
}

/// The fixed chain, in preference order.
pub fn chain() -> Vec<Box<dyn ScanStrategy>> {
    vec![
        Box::new(NativeDetectorStrategy),
        Box::new(LibraryDetectorStrategy),
        Box::new(FileFallbackStrategy),
    ]
}

/// The strategies whose preconditions hold, preserving chain order.
pub fn select(
    chain: Vec<Box<dyn ScanStrategy>>,
    caps: &Capabilities,
) -> Vec<Box<dyn ScanStrategy>> {
    chain.into_iter().filter(|s| s.available(caps)).collect()
}

/// A decode is only a result once trimmed and non-empty; whitespace-only
/// text is "nothing found".
pub(crate) fn usable_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_order_is_the_fallback_order() {
        let ids: Vec<Strategy> = chain().iter().map(|s| s.id()).collect();
        assert_eq!(
            ids,
            vec![
                Strategy::NativeDetector,
                Strategy::LibraryDetector,
                Strategy::FileFallback
            ]
        );
    }

    #[test]
    fn no_live_capabilities_selects_only_file_fallback() {
        let caps = Capabilities::default();
        let ids: Vec<Strategy> = select(chain(), &caps).iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![Strategy::FileFallback]);
    }

    #[test]
    fn media_stream_without_native_decoder_skips_native() {
        let caps = Capabilities {
            secure_context: true,
            has_media_stream: true,
            has_native_decoder: false,
            has_enumerate_devices: true,
        };
        let ids: Vec<Strategy> = select(chain(), &caps).iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![Strategy::LibraryDetector, Strategy::FileFallback]);
    }

    #[test]
    fn full_capabilities_keep_the_whole_chain() {
        let caps = Capabilities {
            secure_context: true,
            has_media_stream: true,
            has_native_decoder: true,
            has_enumerate_devices: true,
        };
        assert_eq!(select(chain(), &caps).len(), 3);
    }

    #[test]
    fn selection_can_come_up_empty_for_live_only_chains() {
        // The shipped chain always ends in FileFallback; a live-only chain is
        // how the none-qualify arm of the session is exercised.
        let live_only: Vec<Box<dyn ScanStrategy>> = vec![
            Box::new(NativeDetectorStrategy),
            Box::new(LibraryDetectorStrategy),
        ];
        assert!(select(live_only, &Capabilities::default()).is_empty());
    }

    #[test]
    fn whitespace_decodes_are_nothing_found() {
        assert_eq!(usable_text("  ABC123  "), Some("ABC123".to_string()));
        assert_eq!(usable_text("   "), None);
        assert_eq!(usable_text(""), None);
    }

    #[test]
    fn strategy_round_trips_through_str() {
        for strategy in [
            Strategy::NativeDetector,
            Strategy::LibraryDetector,
            Strategy::FileFallback,
        ] {
            assert_eq!(strategy.as_str().parse::<Strategy>().unwrap(), strategy);
        }
    }
}
