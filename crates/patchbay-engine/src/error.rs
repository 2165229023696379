use thiserror::Error;

use crate::session::SessionId;

/// Top-level error type for the `patchbay-engine` crate.
///
/// Only programming errors and engine start-up failures are modeled here.
/// Network-level non-delivery of a request is never an error at this
/// layer; it shows up as the absence of the expected update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    // ── Lifecycle ───────────────────────────────────────────────────
    /// The engine could not be initialized (fatal at construction).
    #[error("Session engine failed to initialize: {reason}")]
    InitFailed { reason: String },

    /// The session was closed and can no longer be used.
    #[error("Session {session} is closed")]
    SessionClosed { session: SessionId },

    /// The session id was never issued by this engine.
    #[error("Unknown session {session}")]
    UnknownSession { session: SessionId },

    // ── Transport ───────────────────────────────────────────────────
    /// The update feed behind a session went away unexpectedly.
    #[error("Update feed for session {session} disconnected")]
    Disconnected { session: SessionId },
}
