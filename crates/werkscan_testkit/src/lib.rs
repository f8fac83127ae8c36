//! Scripted stand-ins for the werkscan platform seams.
//!
//! Real cameras and decoder assets do not exist in CI; these scripted
//! implementations let tests and the replay harness drive the engine through
//! exact capability/frame/error sequences and observe resource handling
//! (live-stream counts, release ordering, callback cardinality).

pub mod engine;
pub mod recorder;
pub mod scenario;
pub mod scripted;

pub use engine::{FetchStep, ImageStep, LiveStep, ScriptedEngine, ScriptedFetch};
pub use recorder::CallbackRecorder;
pub use scenario::{ErrorSpec, Scenario, ScenarioRig};
pub use scripted::{test_frame, DetectStep, ScriptedDetector, ScriptedPlatform, StillStep, StreamStep};
