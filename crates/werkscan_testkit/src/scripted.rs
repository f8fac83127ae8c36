//! Scripted camera platform.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use werkscan_engine::capability::{Capabilities, CameraDevice};
use werkscan_engine::platform::{
    CameraPlatform, CameraStream, Frame, FrameDetector, ImageData, PlatformError, StreamRequest,
};

/// A dummy frame; pixel content is opaque to the engine.
pub fn test_frame() -> Frame {
    Frame {
        width: 640,
        height: 480,
        data: Arc::from(vec![0u8; 16]),
    }
}

/// One scripted step of a live camera stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStep {
    /// Yield a frame.
    Frame,
    /// Fail the frame request with a platform error.
    Raise { code: String, message: String },
    /// Never resolve; only a close can end the wait.
    Pending,
}

/// One scripted answer of the native frame detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectStep {
    Found(String),
    Nothing,
    Raise { code: String, message: String },
}

/// One scripted answer of the still-image surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StillStep {
    /// Supply an image whose bytes are this text (echo decode pairs with it).
    Image(String),
    /// The user dismissed the surface.
    Dismiss,
    Raise { code: String, message: String },
}

#[derive(Debug, Default)]
struct StreamCounters {
    attempts: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

/// Native detector answering from a script; exhausted scripts keep
/// answering "nothing".
pub struct ScriptedDetector {
    steps: Mutex<VecDeque<DetectStep>>,
}

impl ScriptedDetector {
    pub fn new(steps: Vec<DetectStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
        }
    }
}

#[async_trait]
impl FrameDetector for ScriptedDetector {
    async fn detect(&self, _frame: &Frame) -> Result<Option<String>, PlatformError> {
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(DetectStep::Found(text)) => Ok(Some(text)),
            Some(DetectStep::Nothing) | None => Ok(None),
            Some(DetectStep::Raise { code, message }) => Err(PlatformError::new(code, message)),
        }
    }
}

struct ScriptedStream {
    steps: Arc<Mutex<VecDeque<StreamStep>>>,
    counters: Arc<StreamCounters>,
    released: bool,
}

impl ScriptedStream {
    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl CameraStream for ScriptedStream {
    async fn next_frame(&mut self) -> Result<Frame, PlatformError> {
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(StreamStep::Frame) => Ok(test_frame()),
            Some(StreamStep::Raise { code, message }) => Err(PlatformError::new(code, message)),
            Some(StreamStep::Pending) | None => std::future::pending().await,
        }
    }

    fn release(&mut self) {
        self.release_once();
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.release_once();
    }
}

/// Scripted [`CameraPlatform`], built with a fluent builder and observed
/// through counters.
pub struct ScriptedPlatform {
    caps: Capabilities,
    devices: Vec<CameraDevice>,
    enumerate_error: Option<PlatformError>,
    open_stream_error: Option<PlatformError>,
    stream_steps: Arc<Mutex<VecDeque<StreamStep>>>,
    native: Option<Arc<ScriptedDetector>>,
    still_steps: Mutex<VecDeque<StillStep>>,
    still_requests: AtomicUsize,
    counters: Arc<StreamCounters>,
    last_request: Mutex<Option<StreamRequest>>,
}

impl ScriptedPlatform {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            caps,
            devices: Vec::new(),
            enumerate_error: None,
            open_stream_error: None,
            stream_steps: Arc::new(Mutex::new(VecDeque::new())),
            native: None,
            still_steps: Mutex::new(VecDeque::new()),
            still_requests: AtomicUsize::new(0),
            counters: Arc::new(StreamCounters::default()),
            last_request: Mutex::new(None),
        }
    }

    pub fn with_devices(mut self, devices: Vec<CameraDevice>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_enumerate_error(mut self, code: &str, message: &str) -> Self {
        self.enumerate_error = Some(PlatformError::new(code, message));
        self
    }

    pub fn with_open_stream_error(mut self, code: &str, message: &str) -> Self {
        self.open_stream_error = Some(PlatformError::new(code, message));
        self
    }

    /// Steps drained across all opened streams, in order.
    pub fn with_stream_steps(self, steps: Vec<StreamStep>) -> Self {
        *self.stream_steps.lock().unwrap() = steps.into();
        self
    }

    pub fn with_native_detector(mut self, steps: Vec<DetectStep>) -> Self {
        self.native = Some(Arc::new(ScriptedDetector::new(steps)));
        self
    }

    pub fn with_still_images(self, steps: Vec<StillStep>) -> Self {
        *self.still_steps.lock().unwrap() = steps.into();
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Stream acquisition attempts, including refused ones.
    pub fn open_stream_attempts(&self) -> usize {
        self.counters.attempts.load(Ordering::SeqCst)
    }

    /// Currently-live streams.
    pub fn live_streams(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// High-water mark of simultaneously-live streams.
    pub fn max_live_streams(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }

    pub fn still_image_requests(&self) -> usize {
        self.still_requests.load(Ordering::SeqCst)
    }

    pub fn last_stream_request(&self) -> Option<StreamRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl CameraPlatform for ScriptedPlatform {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    async fn enumerate_devices(&self) -> Result<Vec<CameraDevice>, PlatformError> {
        match &self.enumerate_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.devices.clone()),
        }
    }

    async fn open_stream(
        &self,
        request: &StreamRequest,
    ) -> Result<Box<dyn CameraStream>, PlatformError> {
        self.counters.attempts.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        if let Some(err) = &self.open_stream_error {
            return Err(err.clone());
        }
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            steps: self.stream_steps.clone(),
            counters: self.counters.clone(),
            released: false,
        }))
    }

    fn native_detector(&self) -> Option<Arc<dyn FrameDetector>> {
        self.native
            .clone()
            .map(|detector| detector as Arc<dyn FrameDetector>)
    }

    async fn acquire_still_image(&self) -> Result<Option<ImageData>, PlatformError> {
        self.still_requests.fetch_add(1, Ordering::SeqCst);
        let step = self.still_steps.lock().unwrap().pop_front();
        match step {
            Some(StillStep::Image(text)) => Ok(Some(ImageData {
                data: Arc::from(text.into_bytes()),
                mime: "image/png".to_string(),
            })),
            Some(StillStep::Dismiss) | None => Ok(None),
            Some(StillStep::Raise { code, message }) => Err(PlatformError::new(code, message)),
        }
    }
}
