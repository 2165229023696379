// ── Test fixtures ──
//
// Record builders and a scripted session engine shared by the unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use patchbay_engine::{
    ConnectionId, ConnectionRecord, DeviceRecord, DeviceState, Direction, EngineError, EntityKey,
    LinkId, LinkRecord, PropertyMap, Record, Request, SessionEngine, SessionId, SignalId,
    SignalRecord, SignalType, SubscriptionFlags, TimeTag, Update, CacheId,
};

use crate::model::Action;
use crate::store::{Db, Handler, handler};

// ── Record builders ────────────────────────────────────────────────

pub(crate) fn device(name: &str) -> Update {
    Update::upsert(
        TimeTag::new(1, 0),
        Record::Device(DeviceRecord {
            name: name.into(),
            host: Some("localhost".into()),
            port: Some(9000),
            version: 0,
            state: DeviceState::Ready,
            properties: PropertyMap::new(),
        }),
    )
}

pub(crate) fn device_v(name: &str, version: u32, time: TimeTag) -> Update {
    let mut u = device(name);
    u.time = time;
    if let patchbay_engine::Change::Upsert(Record::Device(ref mut d)) = u.change {
        d.version = version;
    }
    u
}

pub(crate) fn signal(dev: &str, name: &str, direction: Direction) -> Update {
    Update::upsert(
        TimeTag::new(1, 0),
        Record::Signal(SignalRecord {
            id: SignalId::new(dev, name),
            direction,
            data_type: SignalType::Float,
            length: 1,
            unit: None,
            minimum: None,
            maximum: None,
            properties: PropertyMap::new(),
        }),
    )
}

pub(crate) fn link(src: &str, dst: &str) -> Update {
    Update::upsert(
        TimeTag::new(1, 0),
        Record::Link(LinkRecord {
            id: LinkId::new(src, dst),
            scopes: vec![src.into()],
            properties: PropertyMap::new(),
        }),
    )
}

pub(crate) fn conn_id(src: &str, dst: &str) -> ConnectionId {
    ConnectionId::new(src.parse().unwrap(), dst.parse().unwrap())
}

pub(crate) fn connection(src: &str, dst: &str) -> Update {
    Update::upsert(
        TimeTag::new(1, 0),
        Record::Connection(ConnectionRecord::with_defaults(conn_id(src, dst))),
    )
}

pub(crate) fn removed(key: EntityKey) -> Update {
    Update::remove(TimeTag::new(2, 0), key)
}

// ── Event recording ────────────────────────────────────────────────

/// Shared log of `"<kind> <identity> <action>"` lines.
pub(crate) type EventLog = Arc<Mutex<Vec<String>>>;

pub(crate) fn record_all(db: &mut Db) -> EventLog {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    db.add_device_callback(recorder(&log, |d: &crate::Device| format!("device {}", d.name)))
        .unwrap();
    db.add_signal_callback(recorder(&log, |s: &crate::Signal| format!("signal {}", s.id)))
        .unwrap();
    db.add_link_callback(recorder(&log, |l: &crate::Link| format!("link {}", l.id)))
        .unwrap();
    db.add_connection_callback(recorder(&log, |c: &crate::Connection| {
        format!("connection {}", c.id)
    }))
    .unwrap();
    log
}

pub(crate) fn recorder<T: 'static>(
    log: &EventLog,
    label: impl Fn(&T) -> String + Send + Sync + 'static,
) -> Handler<T> {
    let log = Arc::clone(log);
    handler(move |v: &T, action: Action| {
        log.lock().push(format!("{} {action}", label(v)));
    })
}

pub(crate) fn take(log: &EventLog) -> Vec<String> {
    std::mem::take(&mut *log.lock())
}

// ── Scripted engine ────────────────────────────────────────────────

/// What a [`ScriptedEngine`] saw, shared so tests can inspect it after
/// the engine moved into a monitor.
#[derive(Debug, Default)]
pub(crate) struct Script {
    pub batches: VecDeque<Vec<Update>>,
    pub requests: Vec<Request>,
    pub drains: Vec<Duration>,
    pub closes: usize,
    pub open_flags: Option<SubscriptionFlags>,
    pub fail_attach: bool,
    /// Drains fail once the scripted batches run out.
    pub fail_drain_when_empty: bool,
    pub fail_submit: bool,
}

/// Session engine double: every `drain` pops the next scripted batch.
#[derive(Clone, Default)]
pub(crate) struct ScriptedEngine {
    pub script: Arc<Mutex<Script>>,
    open: bool,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, batch: Vec<Update>) {
        self.script.lock().batches.push_back(batch);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.script.lock().requests.clone()
    }

    pub fn closes(&self) -> usize {
        self.script.lock().closes
    }
}

const SESSION: SessionId = SessionId(7);

impl SessionEngine for ScriptedEngine {
    fn open(&mut self, autosubscribe: SubscriptionFlags) -> Result<SessionId, EngineError> {
        self.open = true;
        self.script.lock().open_flags = Some(autosubscribe);
        Ok(SESSION)
    }

    fn attach(&mut self, session: SessionId) -> Result<CacheId, EngineError> {
        if self.script.lock().fail_attach {
            return Err(EngineError::InitFailed {
                reason: "attach refused".into(),
            });
        }
        Ok(CacheId(session.0))
    }

    fn close(&mut self, _session: SessionId) {
        if self.open {
            self.open = false;
            self.script.lock().closes += 1;
        }
    }

    fn drain(&mut self, session: SessionId, timeout: Duration) -> Result<Vec<Update>, EngineError> {
        if !self.open {
            return Err(EngineError::SessionClosed { session });
        }
        let mut script = self.script.lock();
        script.drains.push(timeout);
        match script.batches.pop_front() {
            Some(batch) => Ok(batch),
            None if script.fail_drain_when_empty => Err(EngineError::Disconnected { session }),
            None => Ok(Vec::new()),
        }
    }

    fn submit(&mut self, session: SessionId, request: Request) -> Result<(), EngineError> {
        if !self.open {
            return Err(EngineError::SessionClosed { session });
        }
        let mut script = self.script.lock();
        if script.fail_submit {
            return Err(EngineError::Disconnected { session });
        }
        script.requests.push(request);
        Ok(())
    }

    fn now(&self, session: SessionId) -> Result<TimeTag, EngineError> {
        if !self.open {
            return Err(EngineError::SessionClosed { session });
        }
        Ok(TimeTag::new(42, 0))
    }
}
