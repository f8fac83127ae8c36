//! Callback recorder for asserting cardinality and payloads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use werkscan_engine::session::{ScanCallbacks, ScanResult};
use werkscan_engine::ScanError;

#[derive(Default)]
struct RecorderInner {
    detected: Mutex<Vec<ScanResult>>,
    errors: Mutex<Vec<ScanError>>,
    closes: AtomicUsize,
}

/// Records every callback invocation of one (or more) sessions.
#[derive(Clone, Default)]
pub struct CallbackRecorder {
    inner: Arc<RecorderInner>,
}

impl CallbackRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callbacks wired to this recorder, including the error channel.
    pub fn callbacks(&self) -> ScanCallbacks {
        let detected = self.inner.clone();
        let closed = self.inner.clone();
        let errored = self.inner.clone();
        ScanCallbacks::new(
            move |result| detected.detected.lock().unwrap().push(result),
            move || {
                closed.closes.fetch_add(1, Ordering::SeqCst);
            },
        )
        .with_error(move |error| errored.errors.lock().unwrap().push(error.clone()))
    }

    pub fn detected(&self) -> Vec<ScanResult> {
        self.inner.detected.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<ScanError> {
        self.inner.errors.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }
}
