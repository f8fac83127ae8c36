//! Serde scenario files for the replay harness.
//!
//! A scenario is one scripted environment: capability facts, devices, stream
//! and decoder scripts. `build()` assembles the scripted platform and fetch
//! the replay harness (or a test) hands to `Scanner::new`.

use crate::engine::{FetchStep, ImageStep, LiveStep, ScriptedEngine, ScriptedFetch};
use crate::scripted::{DetectStep, ScriptedPlatform, StillStep, StreamStep};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use werkscan_engine::capability::{Capabilities, CameraDevice};
use werkscan_engine::config::ScanConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorSpec {
    pub code: String,
    pub message: String,
}

/// One scripted environment, loadable from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub capabilities: Capabilities,
    pub devices: Vec<CameraDevice>,
    /// Frame script shared by every stream the scenario opens.
    pub stream: Vec<StreamStep>,
    pub open_stream_error: Option<ErrorSpec>,
    pub enumerate_error: Option<ErrorSpec>,
    /// Native detector script; present only when the scenario has one.
    pub native_detect: Option<Vec<DetectStep>>,
    /// External engine live-decode script.
    pub live_decode: Vec<LiveStep>,
    pub start_live_error: Option<ErrorSpec>,
    /// Single-shot decode script; empty means echo the image bytes.
    pub image_decode: Vec<ImageStep>,
    /// Still-image surface script.
    pub still_images: Vec<StillStep>,
    /// Decoder fetch outcomes; exhausted (or empty) means success.
    pub decoder_fetch: Vec<FetchStep>,
    /// The decoder asset host is unreachable for the whole scenario.
    pub decoder_unavailable: bool,
    pub config: ScanConfig,
}

/// The assembled seams for one scenario run.
pub struct ScenarioRig {
    pub platform: Arc<ScriptedPlatform>,
    pub fetch: Arc<ScriptedFetch>,
    pub engine: Arc<ScriptedEngine>,
    pub config: ScanConfig,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse scenario JSON")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn build(&self) -> ScenarioRig {
        let mut platform = ScriptedPlatform::new(self.capabilities)
            .with_devices(self.devices.clone())
            .with_stream_steps(self.stream.clone())
            .with_still_images(self.still_images.clone());
        if let Some(spec) = &self.open_stream_error {
            platform = platform.with_open_stream_error(&spec.code, &spec.message);
        }
        if let Some(spec) = &self.enumerate_error {
            platform = platform.with_enumerate_error(&spec.code, &spec.message);
        }
        if let Some(steps) = &self.native_detect {
            platform = platform.with_native_detector(steps.clone());
        }

        let mut engine = ScriptedEngine::new().with_live_steps(self.live_decode.clone());
        if let Some(spec) = &self.start_live_error {
            engine = engine.with_start_live_error(&spec.code, &spec.message);
        }
        if !self.image_decode.is_empty() {
            engine = engine.with_image_steps(self.image_decode.clone());
        }
        let engine = engine.into_arc();

        let fetch = if self.decoder_unavailable {
            ScriptedFetch::unavailable()
        } else {
            ScriptedFetch::with_outcomes(engine.clone(), self.decoder_fetch.clone())
        };

        ScenarioRig {
            platform: platform.into_arc(),
            fetch,
            engine,
            config: self.config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_scenario_parses_with_defaults() {
        let scenario = Scenario::from_json(r#"{"capabilities": {"has_media_stream": true}}"#)
            .expect("minimal scenario");
        assert!(scenario.capabilities.has_media_stream);
        assert!(!scenario.capabilities.has_native_decoder);
        assert!(scenario.still_images.is_empty());
        assert_eq!(scenario.config, ScanConfig::default());
    }

    #[test]
    fn step_scripts_parse_from_tagged_json() {
        let scenario = Scenario::from_json(
            r#"{
                "capabilities": {"secure_context": true, "has_media_stream": true, "has_native_decoder": true},
                "native_detect": ["nothing", {"raise": {"code": "OperationError", "message": "boom"}}, {"found": "CH-1"}],
                "still_images": [{"image": "CH-2"}, "dismiss"],
                "decoder_fetch": [{"fail": {"code": "NetworkError", "message": "404"}}]
            }"#,
        )
        .expect("scenario with scripts");
        assert_eq!(scenario.native_detect.as_ref().unwrap().len(), 3);
        assert_eq!(scenario.still_images.len(), 2);
        assert_eq!(scenario.decoder_fetch.len(), 1);
    }

    #[test]
    fn unavailable_fetch_overrides_outcomes() {
        let scenario = Scenario::from_json(r#"{"decoder_unavailable": true}"#).unwrap();
        let rig = scenario.build();
        assert_eq!(rig.fetch.calls(), 0);
    }
}
