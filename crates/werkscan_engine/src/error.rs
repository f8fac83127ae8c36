//! Failure taxonomy and the retry/fallback policy.
//!
//! Raw platform failures enter through [`classify`]; everything downstream
//! works with the fixed [`ErrorKind`] taxonomy and the [`Decision`] it maps
//! to. Per-frame "nothing decoded yet" never reaches this module — only
//! actual operation failures are classified.

use crate::platform::PlatformError;
use crate::strategy::Strategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fixed failure taxonomy for one scan attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The user refused camera access. Asking again without user action
    /// would loop.
    PermissionDenied,
    /// No usable camera device for the attempted constraints.
    NoCamera,
    /// The attempted operation is not supported in this environment.
    Unsupported,
    /// The external decoding engine could not be obtained.
    LibraryLoadFailure,
    /// A decode attempt failed in a way that may succeed on retry.
    TransientDecodeFailure,
    /// Unrecognized platform error identifier.
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::NoCamera => "no_camera",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::LibraryLoadFailure => "library_load_failure",
            ErrorKind::TransientDecodeFailure => "transient_decode_failure",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classified failure, carrying the platform message verbatim and the
/// strategy that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message} (strategy: {strategy})")]
pub struct ScanError {
    pub kind: ErrorKind,
    pub message: String,
    pub strategy: Strategy,
}

impl ScanError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            kind,
            message: message.into(),
            strategy,
        }
    }

    /// Whether surfacing this error to the user is the only useful move.
    pub fn is_surfaced(&self) -> bool {
        matches!(self.decision(), Decision::Surface)
    }

    pub fn decision(&self) -> Decision {
        decide(self)
    }
}

/// What the session does with a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Absorb and keep scanning with the same strategy.
    Retry,
    /// Advance to the next strategy in the chain.
    Fallback,
    /// Terminal: report to the user.
    Surface,
}

/// Deterministic matching of known platform error identifiers with an
/// `Unknown` catch-all. The identifiers are the web-platform names the host
/// reports for permission refusal, missing devices, unsatisfiable
/// constraints and unsupported operations.
pub fn classify(raw: &PlatformError, strategy: Strategy) -> ScanError {
    let kind = match raw.code.as_str() {
        "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => {
            ErrorKind::PermissionDenied
        }
        "NotFoundError" | "DevicesNotFoundError" | "OverconstrainedError"
        | "ConstraintNotSatisfiedError" | "NotReadableError" | "TrackStartError"
        | "AbortError" => ErrorKind::NoCamera,
        "NotSupportedError" | "InvalidStateError" => ErrorKind::Unsupported,
        "NetworkError" | "ScriptLoadError" => ErrorKind::LibraryLoadFailure,
        "DecodeError" | "ParseError" => ErrorKind::TransientDecodeFailure,
        _ => ErrorKind::Unknown,
    };
    ScanError::new(kind, raw.message.clone(), strategy)
}

/// Policy map from error kind to session behavior.
pub fn decide(error: &ScanError) -> Decision {
    match error.kind {
        ErrorKind::PermissionDenied | ErrorKind::Unknown => Decision::Surface,
        ErrorKind::NoCamera | ErrorKind::Unsupported | ErrorKind::LibraryLoadFailure => {
            Decision::Fallback
        }
        ErrorKind::TransientDecodeFailure => Decision::Retry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(code: &str) -> PlatformError {
        PlatformError::new(code, "platform detail")
    }

    #[test]
    fn permission_refusal_is_surfaced() {
        for code in ["NotAllowedError", "PermissionDeniedError", "SecurityError"] {
            let err = classify(&raw(code), Strategy::NativeDetector);
            assert_eq!(err.kind, ErrorKind::PermissionDenied, "code {code}");
            assert_eq!(err.decision(), Decision::Surface);
        }
    }

    #[test]
    fn missing_or_unusable_devices_fall_back() {
        for code in [
            "NotFoundError",
            "DevicesNotFoundError",
            "OverconstrainedError",
            "NotReadableError",
        ] {
            let err = classify(&raw(code), Strategy::NativeDetector);
            assert_eq!(err.kind, ErrorKind::NoCamera, "code {code}");
            assert_eq!(err.decision(), Decision::Fallback);
        }
    }

    #[test]
    fn unsupported_and_load_failures_fall_back() {
        let err = classify(&raw("NotSupportedError"), Strategy::NativeDetector);
        assert_eq!(err.kind, ErrorKind::Unsupported);
        assert_eq!(err.decision(), Decision::Fallback);

        let err = classify(&raw("NetworkError"), Strategy::LibraryDetector);
        assert_eq!(err.kind, ErrorKind::LibraryLoadFailure);
        assert_eq!(err.decision(), Decision::Fallback);
    }

    #[test]
    fn transient_decode_retries() {
        let err = classify(&raw("DecodeError"), Strategy::FileFallback);
        assert_eq!(err.kind, ErrorKind::TransientDecodeFailure);
        assert_eq!(err.decision(), Decision::Retry);
    }

    #[test]
    fn unrecognized_identifiers_surface_verbatim() {
        let err = classify(
            &PlatformError::new("SomethingNovel", "the platform said so"),
            Strategy::LibraryDetector,
        );
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.decision(), Decision::Surface);
        assert_eq!(err.message, "the platform said so");
    }

    #[test]
    fn display_includes_kind_and_strategy() {
        let err = ScanError::new(
            ErrorKind::PermissionDenied,
            "denied",
            Strategy::NativeDetector,
        );
        let rendered = err.to_string();
        assert!(rendered.contains("permission_denied"));
        assert!(rendered.contains("native_detector"));
    }
}
