//! Scan configuration.

use crate::capability::CameraFacing;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for one scanner instance. All fields have workable defaults; the
/// host overrides what it needs (the CLI accepts a toml file of overrides).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Requested decode attempts per second for the external engine's live
    /// mode.
    pub fps: u32,

    /// Square scan box edge (pixels) hint for the external engine.
    pub scan_box: Option<u32>,

    /// Consecutive frame-inspection raises tolerated before the error is
    /// classified. A frame that returns (even "nothing found") resets the
    /// count.
    pub frame_error_tolerance: u32,

    /// Abandon a live library attempt if the engine produces neither a frame
    /// result nor an error for this long. Disabled when unset.
    pub stall_timeout_secs: Option<u64>,

    /// Facing requested when no rear device could be identified.
    pub fallback_facing: CameraFacing,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            scan_box: Some(250),
            frame_error_tolerance: 1,
            stall_timeout_secs: None,
            fallback_facing: CameraFacing::Back,
        }
    }
}

impl ScanConfig {
    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ScanConfig::default();
        assert_eq!(config.fps, 10);
        assert_eq!(config.scan_box, Some(250));
        assert_eq!(config.frame_error_tolerance, 1);
        assert!(config.stall_timeout().is_none());
        assert_eq!(config.fallback_facing, CameraFacing::Back);
    }

    #[test]
    fn partial_overrides_keep_defaults() {
        let config: ScanConfig =
            serde_json::from_str(r#"{"fps": 24, "stall_timeout_secs": 3}"#).unwrap();
        assert_eq!(config.fps, 24);
        assert_eq!(config.stall_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(config.frame_error_tolerance, 1);
    }
}
