// ── Monitor ──
//
// Owns one engine session and the Db attached to it. Everything happens
// on the caller's thread: `poll` drains the engine and applies updates
// to the Db, which dispatches handlers before `poll` returns. Mutations
// are handed to the engine and return immediately; their effects show up
// in a later poll, or never.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use patchbay_engine::{
    ConnectionId, ConnectionProps, LinkId, LinkProps, Request, SessionEngine, SessionId, SignalId,
    SubscriptionFlags, TimeTag, normalize_device_name,
};

use crate::config::MonitorConfig;
use crate::error::CoreError;
use crate::store::Db;

/// Lifecycle of the session a monitor owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Active(SessionId),
    Released,
}

/// A session observing the network through a [`SessionEngine`].
///
/// Construction opens the session and attaches its cache; there is no
/// half-built monitor. [`release`](Self::release) (also run on drop)
/// closes the session exactly once, after which every operation fails
/// with [`CoreError::InvalidSession`].
pub struct Monitor<E: SessionEngine> {
    engine: E,
    state: SessionState,
    db: Db,
    config: MonitorConfig,
}

impl<E: SessionEngine> Monitor<E> {
    /// Open a monitor with no default scope: devices are only mirrored
    /// after [`subscribe`](Self::subscribe).
    pub fn new(engine: E) -> Result<Self, CoreError> {
        Self::from_config(engine, MonitorConfig::default())
    }

    /// Open a monitor that subscribes newly discovered devices with
    /// `flags`.
    pub fn with_autosubscribe(engine: E, flags: SubscriptionFlags) -> Result<Self, CoreError> {
        Self::from_config(
            engine,
            MonitorConfig {
                autosubscribe: flags,
                ..MonitorConfig::default()
            },
        )
    }

    pub fn from_config(mut engine: E, config: MonitorConfig) -> Result<Self, CoreError> {
        let session = engine.open(config.autosubscribe)?;
        let cache = match engine.attach(session) {
            Ok(cache) => cache,
            Err(e) => {
                engine.close(session);
                return Err(e.into());
            }
        };
        info!(session = %session, %cache, autosubscribe = %config.autosubscribe, "monitor opened");

        Ok(Self {
            db: Db::new(cache, config.autosubscribe),
            engine,
            state: SessionState::Active(session),
            config,
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    pub fn valid(&self) -> bool {
        matches!(self.state, SessionState::Active(_))
    }

    /// Session handle, while active.
    pub fn session(&self) -> Option<SessionId> {
        match self.state {
            SessionState::Active(s) => Some(s),
            SessionState::Released => None,
        }
    }

    /// Close the session and invalidate the Db. Idempotent.
    pub fn release(&mut self) {
        if let SessionState::Active(session) = self.state {
            self.state = SessionState::Released;
            self.db.invalidate();
            self.engine.close(session);
            info!(session = %session, "monitor released");
        }
    }

    fn session_id(&self) -> Result<SessionId, CoreError> {
        self.session().ok_or(CoreError::InvalidSession)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Mutable access for handler registration.
    pub fn db_mut(&mut self) -> &mut Db {
        &mut self.db
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    // ── Event loop ───────────────────────────────────────────────────

    /// Wait up to `timeout` for engine activity and apply everything that
    /// arrived. Handlers run before this returns. A zero timeout never
    /// blocks. Returns the number of updates processed.
    ///
    /// An engine failure after some updates were applied ends the poll
    /// early but still reports those updates; the failure is logged and
    /// will surface again on the next poll. It is returned as an error
    /// only when nothing was processed.
    pub fn poll(&mut self, timeout: Duration) -> Result<usize, CoreError> {
        let session = self.session_id()?;
        self.db.apply_queued_scope();

        let mut processed = 0;
        let failure = self.drain_into_db(session, timeout, &mut processed).err();

        if processed > 0 {
            debug!(session = %session, processed, "poll applied updates");
        }
        match failure {
            Some(err) if processed == 0 => Err(err),
            Some(err) => {
                warn!(session = %session, processed, error = %err, "poll stopped early");
                Ok(processed)
            }
            None => Ok(processed),
        }
    }

    fn drain_into_db(
        &mut self,
        session: SessionId,
        timeout: Duration,
        processed: &mut usize,
    ) -> Result<(), CoreError> {
        // Adoptions left over from a failed poll go out first.
        self.subscribe_adopted(session)?;
        let mut wait = timeout;
        loop {
            let batch = self.engine.drain(session, wait)?;
            if batch.is_empty() {
                return Ok(());
            }
            *processed += batch.len();
            for update in batch {
                self.db.apply(update);
            }
            self.subscribe_adopted(session)?;
            if *processed >= self.config.drain_budget {
                return Ok(());
            }
            wait = Duration::ZERO;
        }
    }

    /// Poll until `done` holds for the cache or `timeout` elapses.
    /// Returns whether the predicate was satisfied.
    pub fn poll_until(
        &mut self,
        timeout: Duration,
        mut done: impl FnMut(&Db) -> bool,
    ) -> Result<bool, CoreError> {
        self.session_id()?;
        let deadline = Instant::now() + timeout;
        loop {
            if done(&self.db) {
                return Ok(true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            self.poll(remaining.min(self.config.poll_interval))?;
        }
    }

    /// Devices adopted with the default scope get an explicit subscribe so
    /// engines that do not autosubscribe on their own still deliver. Those
    /// not handed over stay queued for the next poll.
    fn subscribe_adopted(&mut self, session: SessionId) -> Result<(), CoreError> {
        let mut pending = self.db.take_adopted().into_iter();
        while let Some(device) = pending.next() {
            let request = Request::Subscribe {
                flags: self.db.scope(&device),
                device: device.clone(),
                timeout: self.config.subscribe_timeout,
            };
            if let Err(e) = self.engine.submit(session, request) {
                self.db.restore_adopted(std::iter::once(device).chain(pending));
                return Err(e.into());
            }
        }
        Ok(())
    }

    // ── Subscription ─────────────────────────────────────────────────

    /// Mirror `device` with scope `flags`. Empty flags unsubscribe. The
    /// new scope applies from the next poll; `timeout` is the lease handed
    /// to the engine.
    pub fn subscribe(
        &mut self,
        device: &str,
        flags: SubscriptionFlags,
        timeout: Duration,
    ) -> Result<(), CoreError> {
        let session = self.session_id()?;
        if flags.is_empty() {
            return self.unsubscribe(device);
        }
        let device = device_name(device)?;
        self.db.queue_scope(device.clone(), flags);
        debug!(session = %session, device = %device, %flags, ?timeout, "subscribe");
        self.submit(
            session,
            Request::Subscribe {
                device,
                flags,
                timeout,
            },
        )
    }

    pub fn unsubscribe(&mut self, device: &str) -> Result<(), CoreError> {
        let session = self.session_id()?;
        let device = device_name(device)?;
        self.db
            .queue_scope(device.clone(), SubscriptionFlags::empty());
        debug!(session = %session, device = %device, "unsubscribe");
        self.submit(session, Request::Unsubscribe { device })
    }

    /// Set the default scope for devices discovered from now on. Devices
    /// already tracked keep their scope.
    pub fn autosubscribe(&mut self, flags: SubscriptionFlags) -> Result<(), CoreError> {
        let session = self.session_id()?;
        self.db.set_autosubscribe(flags);
        debug!(session = %session, %flags, "autosubscribe");
        self.submit(session, Request::SetAutosubscribe { flags })
    }

    // ── Topology mutation ────────────────────────────────────────────

    pub fn link(&mut self, source: &str, dest: &str, props: LinkProps) -> Result<(), CoreError> {
        let session = self.session_id()?;
        let id = link_id(source, dest)?;
        self.submit(session, Request::Link { id, props })
    }

    pub fn unlink(&mut self, source: &str, dest: &str) -> Result<(), CoreError> {
        let session = self.session_id()?;
        let id = link_id(source, dest)?;
        self.submit(session, Request::Unlink { id })
    }

    /// Connect two signals given as `"device/signal"`.
    pub fn connect(
        &mut self,
        source: &str,
        dest: &str,
        props: ConnectionProps,
    ) -> Result<(), CoreError> {
        let session = self.session_id()?;
        let id = connection_id(source, dest)?;
        self.submit(session, Request::Connect { id, props })
    }

    pub fn disconnect(&mut self, source: &str, dest: &str) -> Result<(), CoreError> {
        let session = self.session_id()?;
        let id = connection_id(source, dest)?;
        self.submit(session, Request::Disconnect { id })
    }

    /// Change properties of an existing connection. Absent properties keep
    /// their current value.
    pub fn connection_modify(
        &mut self,
        source: &str,
        dest: &str,
        props: ConnectionProps,
    ) -> Result<(), CoreError> {
        let session = self.session_id()?;
        let id = connection_id(source, dest)?;
        if props.is_empty() {
            return Err(CoreError::validation(format!(
                "modify of {id} carries no properties"
            )));
        }
        self.submit(session, Request::ModifyConnection { id, props })
    }

    /// Engine time. Never blocks.
    pub fn now(&self) -> Result<TimeTag, CoreError> {
        let session = self.session_id()?;
        Ok(self.engine.now(session)?)
    }

    fn submit(&mut self, session: SessionId, request: Request) -> Result<(), CoreError> {
        let op = request.op();
        self.engine.submit(session, request).inspect_err(|e| {
            warn!(session = %session, op, error = %e, "request not handed to engine");
        })?;
        Ok(())
    }
}

impl<E: SessionEngine> Drop for Monitor<E> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<E: SessionEngine> std::fmt::Debug for Monitor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("state", &self.state)
            .field("db", &self.db)
            .finish_non_exhaustive()
    }
}

// ── Identity validation ──────────────────────────────────────────────

fn device_name(raw: &str) -> Result<String, CoreError> {
    normalize_device_name(raw).map_err(|e| CoreError::identity(raw, &e))
}

fn signal_id(raw: &str) -> Result<SignalId, CoreError> {
    raw.parse().map_err(|e| CoreError::identity(raw, &e))
}

fn link_id(source: &str, dest: &str) -> Result<LinkId, CoreError> {
    let id = LinkId::new(device_name(source)?, device_name(dest)?);
    if id.source == id.dest {
        return Err(CoreError::validation(format!(
            "cannot link device {} to itself",
            id.source
        )));
    }
    Ok(id)
}

fn connection_id(source: &str, dest: &str) -> Result<ConnectionId, CoreError> {
    let id = ConnectionId::new(signal_id(source)?, signal_id(dest)?);
    if id.source.device == id.dest.device {
        return Err(CoreError::validation(format!(
            "connection {id} must join signals on different devices"
        )));
    }
    Ok(id)
}
