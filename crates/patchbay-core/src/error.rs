// ── Core error types ──
//
// User-facing errors from patchbay-core. Engine failures are translated
// into domain variants; a request the network never honors is not an
// error at all, it simply never shows up in the cache.

use thiserror::Error;

use patchbay_engine::{EngineError, IdentityError};

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    #[error("Session is no longer valid (monitor released)")]
    InvalidSession,

    // ── Input errors ─────────────────────────────────────────────────
    #[error("Invalid identity '{identity}': {reason}")]
    InvalidIdentity { identity: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Engine errors (wrapped, not exposed raw) ─────────────────────
    #[error("Session engine error: {message}")]
    Engine { message: String },
}

impl CoreError {
    pub(crate) fn identity(identity: &str, err: &IdentityError) -> Self {
        Self::InvalidIdentity {
            identity: identity.to_owned(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

// ── Conversion from engine errors ────────────────────────────────────

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::SessionClosed { .. } | EngineError::UnknownSession { .. } => {
                Self::InvalidSession
            }
            other @ (EngineError::InitFailed { .. } | EngineError::Disconnected { .. }) => {
                Self::Engine {
                    message: other.to_string(),
                }
            }
        }
    }
}
