//! Scripted decoder engine and fetch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use werkscan_engine::platform::{
    CameraSourceDescriptor, DecoderEngine, DecoderFetch, ImageData, LiveDecodeOptions, LiveDecoder,
    PlatformError,
};

/// One scripted answer of the live decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStep {
    Found(String),
    Nothing,
    Raise { code: String, message: String },
    /// Never resolve; pairs with stall-timeout and close tests.
    Pending,
}

/// One scripted answer of the single-shot image decode. Without a script the
/// engine echoes the image bytes as UTF-8.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStep {
    Found(String),
    Nothing,
    Raise { code: String, message: String },
}

/// One scripted fetch outcome; exhausted scripts keep succeeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStep {
    Ok,
    Fail { code: String, message: String },
}

/// Scripted [`DecoderEngine`].
pub struct ScriptedEngine {
    live_steps: Arc<Mutex<VecDeque<LiveStep>>>,
    start_live_error: Option<PlatformError>,
    image_steps: Option<Mutex<VecDeque<ImageStep>>>,
    live_started: AtomicUsize,
    live_active: Arc<AtomicUsize>,
    last_source: Mutex<Option<CameraSourceDescriptor>>,
    last_options: Mutex<Option<LiveDecodeOptions>>,
}

impl ScriptedEngine {
    /// Engine with no live script (live polls hang) and echo image decode.
    pub fn new() -> Self {
        Self {
            live_steps: Arc::new(Mutex::new(VecDeque::new())),
            start_live_error: None,
            image_steps: None,
            live_started: AtomicUsize::new(0),
            live_active: Arc::new(AtomicUsize::new(0)),
            last_source: Mutex::new(None),
            last_options: Mutex::new(None),
        }
    }

    pub fn with_live_steps(self, steps: Vec<LiveStep>) -> Self {
        *self.live_steps.lock().unwrap() = steps.into();
        self
    }

    pub fn with_start_live_error(mut self, code: &str, message: &str) -> Self {
        self.start_live_error = Some(PlatformError::new(code, message));
        self
    }

    pub fn with_image_steps(mut self, steps: Vec<ImageStep>) -> Self {
        self.image_steps = Some(Mutex::new(steps.into()));
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Live decode sessions started over the engine's lifetime.
    pub fn live_started(&self) -> usize {
        self.live_started.load(Ordering::SeqCst)
    }

    /// Live decode sessions not yet stopped.
    pub fn live_active(&self) -> usize {
        self.live_active.load(Ordering::SeqCst)
    }

    pub fn last_source(&self) -> Option<CameraSourceDescriptor> {
        self.last_source.lock().unwrap().clone()
    }

    pub fn last_options(&self) -> Option<LiveDecodeOptions> {
        self.last_options.lock().unwrap().clone()
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScriptedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedEngine")
            .field("live_started", &self.live_started())
            .field("live_active", &self.live_active())
            .finish_non_exhaustive()
    }
}

struct ScriptedLiveDecoder {
    steps: Arc<Mutex<VecDeque<LiveStep>>>,
    active: Arc<AtomicUsize>,
    stopped: bool,
}

impl ScriptedLiveDecoder {
    fn stop_once(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl LiveDecoder for ScriptedLiveDecoder {
    async fn poll_decode(&mut self) -> Result<Option<String>, PlatformError> {
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(LiveStep::Found(text)) => Ok(Some(text)),
            Some(LiveStep::Nothing) => Ok(None),
            Some(LiveStep::Raise { code, message }) => Err(PlatformError::new(code, message)),
            Some(LiveStep::Pending) | None => std::future::pending().await,
        }
    }

    fn stop(&mut self) {
        self.stop_once();
    }
}

impl Drop for ScriptedLiveDecoder {
    fn drop(&mut self) {
        self.stop_once();
    }
}

#[async_trait]
impl DecoderEngine for ScriptedEngine {
    async fn start_live(
        &self,
        source: &CameraSourceDescriptor,
        options: &LiveDecodeOptions,
    ) -> Result<Box<dyn LiveDecoder>, PlatformError> {
        *self.last_source.lock().unwrap() = Some(source.clone());
        *self.last_options.lock().unwrap() = Some(options.clone());
        if let Some(err) = &self.start_live_error {
            return Err(err.clone());
        }
        self.live_started.fetch_add(1, Ordering::SeqCst);
        self.live_active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedLiveDecoder {
            steps: self.live_steps.clone(),
            active: self.live_active.clone(),
            stopped: false,
        }))
    }

    async fn decode_image(&self, image: &ImageData) -> Result<Option<String>, PlatformError> {
        match &self.image_steps {
            Some(steps) => {
                let step = steps.lock().unwrap().pop_front();
                match step {
                    Some(ImageStep::Found(text)) => Ok(Some(text)),
                    Some(ImageStep::Nothing) | None => Ok(None),
                    Some(ImageStep::Raise { code, message }) => {
                        Err(PlatformError::new(code, message))
                    }
                }
            }
            None => {
                // Echo mode: the image bytes are the payload.
                let text = String::from_utf8_lossy(&image.data).to_string();
                if text.trim().is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(text))
                }
            }
        }
    }
}

/// Scripted [`DecoderFetch`] handing out one shared engine.
pub struct ScriptedFetch {
    engine: Arc<ScriptedEngine>,
    outcomes: Mutex<VecDeque<FetchStep>>,
    always_fail: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedFetch {
    pub fn new(engine: Arc<ScriptedEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            outcomes: Mutex::new(VecDeque::new()),
            always_fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    /// Fetch that never succeeds (the asset host is unreachable).
    pub fn unavailable() -> Arc<Self> {
        let fetch = Self::new(ScriptedEngine::new().into_arc());
        fetch.always_fail.store(true, Ordering::SeqCst);
        fetch
    }

    /// Script the first outcomes; once exhausted every fetch succeeds.
    pub fn with_outcomes(engine: Arc<ScriptedEngine>, outcomes: Vec<FetchStep>) -> Arc<Self> {
        let fetch = Self::new(engine);
        *fetch.outcomes.lock().unwrap() = outcomes.into();
        fetch
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecoderFetch for ScriptedFetch {
    async fn fetch(&self) -> Result<Arc<dyn DecoderEngine>, PlatformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(PlatformError::new(
                "NetworkError",
                "decoder asset host unreachable",
            ));
        }
        let step = self.outcomes.lock().unwrap().pop_front();
        match step {
            Some(FetchStep::Fail { code, message }) => Err(PlatformError::new(code, message)),
            Some(FetchStep::Ok) | None => Ok(self.engine.clone() as Arc<dyn DecoderEngine>),
        }
    }
}
