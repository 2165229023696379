// ── Session engine capability ──
//
// The only boundary between a monitor and the network. Implementations
// own discovery, metadata exchange and request delivery; the monitor
// only opens a session, drains updates and hands over requests.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::flags::SubscriptionFlags;
use crate::record::Update;
use crate::request::Request;
use crate::timetag::TimeTag;

/// Handle for an open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle for the cache attached to a session (1:1 with the session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheId(pub u64);

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "db#{}", self.0)
    }
}

/// Capabilities a monitor needs from a session engine.
///
/// Every method except `open` takes the session it acts on; using a
/// closed or foreign session fails with [`EngineError::SessionClosed`] or
/// [`EngineError::UnknownSession`]. `close` is idempotent.
pub trait SessionEngine {
    /// Open a session whose default scope for newly discovered devices is
    /// `autosubscribe`.
    fn open(&mut self, autosubscribe: SubscriptionFlags) -> Result<SessionId, EngineError>;

    /// Attach the cache for `session`. Attaching twice returns the same id.
    fn attach(&mut self, session: SessionId) -> Result<CacheId, EngineError>;

    /// Release the session. Closing an already closed session is a no-op.
    fn close(&mut self, session: SessionId);

    /// Wait up to `timeout` for activity, then return every update that is
    /// ready without further waiting. A zero timeout never blocks.
    ///
    /// Updates about one entity are returned in the order they were
    /// observed.
    fn drain(&mut self, session: SessionId, timeout: Duration) -> Result<Vec<Update>, EngineError>;

    /// Hand a request to the engine. Returns as soon as the request is
    /// queued; no acknowledgement is ever produced.
    fn submit(&mut self, session: SessionId, request: Request) -> Result<(), EngineError>;

    /// Engine clock. Never blocks.
    fn now(&self, session: SessionId) -> Result<TimeTag, EngineError>;
}
