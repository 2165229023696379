// ── In-process session engine ──
//
// `LocalNetwork` is a complete network living in one process: devices
// register on it, sessions observe it through `LocalEngine`. Every
// session gets its own unbounded mailbox; `drain` waits on it with
// `recv_timeout` and then takes whatever else is ready.

mod device;
mod topology;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::EngineError;
use crate::flags::SubscriptionFlags;
use crate::record::Update;
use crate::request::Request;
use crate::session::{CacheId, SessionEngine, SessionId};
use crate::timetag::TimeTag;

pub use device::{LocalDevice, SignalSpec};
use topology::NetworkState;

/// A shared in-process network. Cloning yields another handle to the same
/// network.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device named `prefix.N`. It stays on the network until
    /// the returned handle is dropped.
    pub fn add_device(&self, prefix: &str) -> LocalDevice {
        let name = self.state.lock().add_device(prefix.trim_start_matches('/'));
        LocalDevice::new(name, Arc::clone(&self.state))
    }

    /// Names of every device currently registered, in registration order.
    pub fn device_names(&self) -> Vec<String> {
        self.state.lock().devices.keys().cloned().collect()
    }

    /// A session engine observing this network.
    pub fn engine(&self) -> LocalEngine {
        LocalEngine {
            network: self.clone(),
            mailboxes: HashMap::new(),
            closed: HashSet::new(),
        }
    }
}

impl std::fmt::Debug for LocalNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalNetwork")
            .field("devices", &self.device_names())
            .finish_non_exhaustive()
    }
}

/// [`SessionEngine`] backed by a [`LocalNetwork`].
pub struct LocalEngine {
    network: LocalNetwork,
    mailboxes: HashMap<SessionId, Receiver<Update>>,
    closed: HashSet<SessionId>,
}

impl LocalEngine {
    pub fn network(&self) -> &LocalNetwork {
        &self.network
    }

    fn mailbox(&self, session: SessionId) -> Result<&Receiver<Update>, EngineError> {
        self.mailboxes.get(&session).ok_or_else(|| {
            if self.closed.contains(&session) {
                EngineError::SessionClosed { session }
            } else {
                EngineError::UnknownSession { session }
            }
        })
    }
}

impl SessionEngine for LocalEngine {
    fn open(&mut self, autosubscribe: SubscriptionFlags) -> Result<SessionId, EngineError> {
        let (tx, rx) = unbounded();
        let session = self.network.state.lock().open_session(tx, autosubscribe);
        self.mailboxes.insert(session, rx);
        Ok(session)
    }

    fn attach(&mut self, session: SessionId) -> Result<CacheId, EngineError> {
        self.mailbox(session)?;
        self.network
            .state
            .lock()
            .attach(session)
            .ok_or(EngineError::UnknownSession { session })
    }

    fn close(&mut self, session: SessionId) {
        if self.mailboxes.remove(&session).is_some() {
            self.network.state.lock().close_session(session);
            self.closed.insert(session);
        }
    }

    fn drain(&mut self, session: SessionId, timeout: Duration) -> Result<Vec<Update>, EngineError> {
        let rx = self.mailbox(session)?;
        let mut out = Vec::new();
        if !timeout.is_zero() {
            match rx.recv_timeout(timeout) {
                Ok(update) => out.push(update),
                Err(RecvTimeoutError::Timeout) => return Ok(out),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(EngineError::Disconnected { session });
                }
            }
        }
        out.extend(rx.try_iter());
        if !out.is_empty() {
            debug!(session = %session, count = out.len(), "drained updates");
        }
        Ok(out)
    }

    fn submit(&mut self, session: SessionId, request: Request) -> Result<(), EngineError> {
        self.mailbox(session)?;
        self.network.state.lock().handle(session, request);
        Ok(())
    }

    fn now(&self, session: SessionId) -> Result<TimeTag, EngineError> {
        self.mailbox(session)?;
        Ok(TimeTag::now())
    }
}

impl Drop for LocalEngine {
    fn drop(&mut self) {
        let mut state = self.network.state.lock();
        for session in self.mailboxes.keys() {
            state.close_session(*session);
        }
    }
}
