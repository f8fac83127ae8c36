//! Trait seams to the host environment.
//!
//! The engine never touches a real camera or decoder directly. The host app
//! (the shop-floor UI shell, or a scripted stand-in from `werkscan_testkit`)
//! implements these traits; the engine only discovers, selects, drives and
//! retires the capabilities behind them.

use crate::capability::{Capabilities, CameraDevice, CameraFacing};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Raw failure reported by the host platform, before classification.
///
/// `code` is the platform's stable error identifier (the web-platform names
/// the host reports: "NotAllowedError", "NotFoundError", ...). The engine
/// matches on `code`; `message` is carried verbatim for the user.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct PlatformError {
    pub code: String,
    pub message: String,
}

impl PlatformError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// One video frame handed to a detector. Pixel data is opaque to the engine.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

/// A still image supplied by the host's capture/selection surface.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub data: Arc<[u8]>,
    pub mime: String,
}

/// Constraints for acquiring a live camera stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// Specific device, when enumeration identified one.
    pub device_id: Option<String>,
    /// Generic facing request used when no device was chosen.
    pub facing: CameraFacing,
}

/// Camera source handed to the external decoder engine, which drives the
/// camera itself in live mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraSourceDescriptor {
    /// A device identified through enumeration.
    Device { id: String },
    /// Generic facing request when no device could be identified.
    Facing(CameraFacing),
}

/// Cadence and region hints for the external engine's live mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveDecodeOptions {
    /// Requested decode attempts per second.
    pub fps: u32,
    /// Square scan box edge in pixels, when the engine supports one.
    pub scan_box: Option<u32>,
}

/// The host environment: capability facts, device access and the native
/// decode path. One instance lives for the process; sessions borrow it.
#[async_trait]
pub trait CameraPlatform: Send + Sync {
    /// Environment facts. Read once per scan attempt; never fails.
    fn capabilities(&self) -> Capabilities;

    /// Enumerate cameras. Only called when `has_enumerate_devices` is set;
    /// the result only biases device selection, it is never required.
    async fn enumerate_devices(&self) -> Result<Vec<CameraDevice>, PlatformError>;

    /// Acquire an exclusive live stream. Suspends at the permission prompt.
    async fn open_stream(&self, request: &StreamRequest)
        -> Result<Box<dyn CameraStream>, PlatformError>;

    /// The platform's native frame detector, when it has one.
    fn native_detector(&self) -> Option<Arc<dyn FrameDetector>>;

    /// Present the host's still-image capture/selection surface and wait for
    /// an image. `Ok(None)` means the user dismissed the surface.
    async fn acquire_still_image(&self) -> Result<Option<ImageData>, PlatformError>;
}

/// An exclusively-owned live camera stream.
#[async_trait]
pub trait CameraStream: Send {
    /// The next frame at the device's own cadence. The engine imposes no
    /// interval of its own.
    async fn next_frame(&mut self) -> Result<Frame, PlatformError>;

    /// Release the underlying device. Idempotent.
    fn release(&mut self);
}

/// Native single-frame decode capability.
#[async_trait]
pub trait FrameDetector: Send + Sync {
    /// Inspect one frame. `Ok(None)` when no code is present — that is the
    /// normal result on most frames and is never an error.
    async fn detect(&self, frame: &Frame) -> Result<Option<String>, PlatformError>;
}

/// The external decoding engine obtained through the loader. Stateless decode
/// logic; the handle is shared read-only across sessions.
#[async_trait]
pub trait DecoderEngine: Send + Sync + std::fmt::Debug {
    /// Start continuous decode with the engine driving the camera itself.
    async fn start_live(
        &self,
        source: &CameraSourceDescriptor,
        options: &LiveDecodeOptions,
    ) -> Result<Box<dyn LiveDecoder>, PlatformError>;

    /// Single-shot decode of a still image. `Ok(None)` when nothing was found.
    async fn decode_image(&self, image: &ImageData) -> Result<Option<String>, PlatformError>;
}

/// A running live decode owned by one session.
#[async_trait]
pub trait LiveDecoder: Send {
    /// Await the next decode attempt. `Ok(None)` on a frame with no code.
    async fn poll_decode(&mut self) -> Result<Option<String>, PlatformError>;

    /// Stop the engine and release its camera. Idempotent.
    fn stop(&mut self);
}

/// Acquisition of the external engine (network/asset fetch). Injected into
/// the loader so tests can script load races and failures.
#[async_trait]
pub trait DecoderFetch: Send + Sync {
    async fn fetch(&self) -> Result<Arc<dyn DecoderEngine>, PlatformError>;
}
