//! Capability probing and camera device selection.
//!
//! `Capabilities` is a value object computed once per scan attempt and passed
//! explicitly through strategy selection — strategies never re-probe the
//! environment ad hoc. Recomputed on every `open_scan` because the user may
//! change browser/device settings between attempts.

use crate::platform::CameraPlatform;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Boolean facts about the current runtime environment relevant to strategy
/// selection. Read, never configured, by this subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// The context is secure enough for live camera access.
    pub secure_context: bool,
    /// A stream-acquisition API is present.
    pub has_media_stream: bool,
    /// A native decode constructor is present.
    pub has_native_decoder: bool,
    /// A device-enumeration API is present.
    pub has_enumerate_devices: bool,
}

impl Capabilities {
    /// Probe the platform. Side-effect-free apart from reading platform
    /// state; never fails.
    pub fn probe(platform: &dyn CameraPlatform) -> Self {
        let caps = platform.capabilities();
        debug!(
            secure_context = caps.secure_context,
            has_media_stream = caps.has_media_stream,
            has_native_decoder = caps.has_native_decoder,
            has_enumerate_devices = caps.has_enumerate_devices,
            "probed environment"
        );
        caps
    }

    /// Whether any live-camera strategy is worth attempting at all.
    pub fn supports_live_capture(&self) -> bool {
        self.has_media_stream
    }
}

/// Which way a camera points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    Front,
    Back,
    #[default]
    Unknown,
}

impl CameraFacing {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraFacing::Front => "front",
            CameraFacing::Back => "back",
            CameraFacing::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CameraFacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "front" => Ok(CameraFacing::Front),
            "back" => Ok(CameraFacing::Back),
            "unknown" => Ok(CameraFacing::Unknown),
            _ => Err(format!(
                "Invalid camera facing: '{}'. Expected: front, back, or unknown",
                s
            )),
        }
    }
}

/// A camera reported by device enumeration. Used only to bias selection,
/// never required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDevice {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub facing: CameraFacing,
}

impl CameraDevice {
    /// Rear identification: explicit facing, or the label conventions hosts
    /// use when facing is not reported.
    pub fn is_rear_facing(&self) -> bool {
        if self.facing == CameraFacing::Back {
            return true;
        }
        let label = self.label.to_lowercase();
        label.contains("back") || label.contains("rear") || label.contains("environment")
    }
}

/// Rear-biased device choice shared by both live strategies: the device
/// identified as rear-facing, else the first enumerated device.
pub fn pick_rear_device(devices: &[CameraDevice]) -> Option<&CameraDevice> {
    devices
        .iter()
        .find(|d| d.is_rear_facing())
        .or_else(|| devices.first())
}

/// Enumerate and pick, tolerating enumeration failure. `None` means the
/// caller should fall back to a generic facing request.
pub async fn choose_device(
    platform: &dyn CameraPlatform,
    caps: &Capabilities,
) -> Option<CameraDevice> {
    if !caps.has_enumerate_devices {
        return None;
    }
    match platform.enumerate_devices().await {
        Ok(devices) => {
            let chosen = pick_rear_device(&devices).cloned();
            if let Some(device) = &chosen {
                debug!(device_id = %device.id, label = %device.label, facing = %device.facing, "selected camera device");
            }
            chosen
        }
        Err(err) => {
            debug!(error = %err, "device enumeration failed; falling back to facing request");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, label: &str, facing: CameraFacing) -> CameraDevice {
        CameraDevice {
            id: id.to_string(),
            label: label.to_string(),
            facing,
        }
    }

    #[test]
    fn rear_facing_wins_over_order() {
        let devices = vec![
            device("front-1", "FaceTime HD", CameraFacing::Front),
            device("back-1", "Wide Camera", CameraFacing::Back),
        ];
        assert_eq!(pick_rear_device(&devices).unwrap().id, "back-1");
    }

    #[test]
    fn rear_identified_by_label_when_facing_unknown() {
        let devices = vec![
            device("a", "USB Camera", CameraFacing::Unknown),
            device("b", "Rear Camera", CameraFacing::Unknown),
        ];
        assert_eq!(pick_rear_device(&devices).unwrap().id, "b");
    }

    #[test]
    fn first_device_when_no_rear_identified() {
        let devices = vec![
            device("a", "USB Camera", CameraFacing::Unknown),
            device("b", "Other Camera", CameraFacing::Unknown),
        ];
        assert_eq!(pick_rear_device(&devices).unwrap().id, "a");
    }

    #[test]
    fn empty_enumeration_yields_none() {
        assert!(pick_rear_device(&[]).is_none());
    }

    #[test]
    fn facing_round_trips_through_str() {
        for facing in [CameraFacing::Front, CameraFacing::Back, CameraFacing::Unknown] {
            assert_eq!(facing.as_str().parse::<CameraFacing>().unwrap(), facing);
        }
        assert!("sideways".parse::<CameraFacing>().is_err());
    }

    #[test]
    fn live_capture_requires_media_stream() {
        let caps = Capabilities {
            secure_context: true,
            has_media_stream: false,
            has_native_decoder: true,
            has_enumerate_devices: true,
        };
        assert!(!caps.supports_live_capture());
    }
}
