//! Camera code-scanning engine for shop-floor data capture.
//!
//! Given an unreliable, heterogeneous set of device capabilities, turn
//! "point a camera at a code" into a decoded string: probe what the
//! environment offers, walk a fixed strategy fallback chain (native decode,
//! external engine, still-image fallback), release camera resources
//! deterministically, and classify failures precisely enough to guide the
//! user. Decoding itself is an opaque capability behind the `platform`
//! trait seams; the surrounding product (forms, auth, persistence) is an
//! external collaborator.

pub mod capability;
pub mod config;
pub mod error;
pub mod gate;
pub mod loader;
pub mod platform;
pub mod session;
pub mod strategy;

pub use capability::{Capabilities, CameraDevice, CameraFacing};
pub use config::ScanConfig;
pub use error::{classify, decide, Decision, ErrorKind, ScanError};
pub use gate::SessionGate;
pub use loader::{DecoderLoader, LoadError};
pub use session::{
    EventSink, ScanCallbacks, ScanResult, Scanner, SessionEvent, SessionHandle, SessionOutcome,
    SessionState,
};
pub use strategy::Strategy;
