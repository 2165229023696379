// ── Shared state of an in-process network ──
//
// Holds every device, signal, link and connection known to the network
// plus one mailbox per open session. Each mutation is published to the
// mailboxes of the sessions interested in the touched devices.

use std::collections::HashMap;

use crossbeam_channel::Sender;
use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::flags::SubscriptionFlags;
use crate::record::{
    Change, ConnectionId, ConnectionRecord, DeviceRecord, DeviceState, Direction, EntityKey,
    LinkId, LinkRecord, PropertyMap, PropertyValue, Record, SignalId, SignalRecord, Update,
};
use crate::request::{ConnectionProps, LinkProps, Request};
use crate::session::{CacheId, SessionId};
use crate::timetag::TimeTag;

use super::device::SignalSpec;

const FIRST_PORT: u16 = 9000;

pub(crate) struct DeviceEntry {
    pub record: DeviceRecord,
    pub inputs: IndexMap<String, SignalRecord>,
    pub outputs: IndexMap<String, SignalRecord>,
}

impl DeviceEntry {
    fn signals(&self) -> impl Iterator<Item = &SignalRecord> {
        self.outputs.values().chain(self.inputs.values())
    }

    pub fn signal(&self, name: &str) -> Option<&SignalRecord> {
        self.outputs.get(name).or_else(|| self.inputs.get(name))
    }

    pub fn table(&self, direction: Direction) -> &IndexMap<String, SignalRecord> {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    fn table_mut(&mut self, direction: Direction) -> &mut IndexMap<String, SignalRecord> {
        match direction {
            Direction::Input => &mut self.inputs,
            Direction::Output => &mut self.outputs,
        }
    }
}

struct SessionPort {
    tx: Sender<Update>,
    cache: Option<CacheId>,
    autosubscribe: SubscriptionFlags,
    subscriptions: HashMap<String, SubscriptionFlags>,
}

impl SessionPort {
    fn follows(&self, device: &str) -> bool {
        self.subscriptions.contains_key(device)
    }

    /// Discovery is global; everything else only reaches sessions that
    /// follow one of the devices involved.
    fn interested(&self, key: &EntityKey) -> bool {
        match key {
            EntityKey::Device(_) => true,
            EntityKey::Signal(id) => self.follows(&id.device),
            EntityKey::Link(id) => self.follows(&id.source) || self.follows(&id.dest),
            EntityKey::Connection(id) => {
                self.follows(&id.source.device) || self.follows(&id.dest.device)
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct NetworkState {
    pub devices: IndexMap<String, DeviceEntry>,
    links: IndexMap<LinkId, LinkRecord>,
    connections: IndexMap<ConnectionId, ConnectionRecord>,
    sessions: HashMap<SessionId, SessionPort>,
    ordinals: HashMap<String, u32>,
    next_session: u64,
    next_port: u16,
}

impl NetworkState {
    // ── Sessions ────────────────────────────────────────────────────

    pub fn open_session(&mut self, tx: Sender<Update>, autosubscribe: SubscriptionFlags) -> SessionId {
        self.next_session += 1;
        let id = SessionId(self.next_session);
        let mut port = SessionPort {
            tx,
            cache: None,
            autosubscribe,
            subscriptions: HashMap::new(),
        };
        // Devices already on the network are announced to the newcomer.
        for entry in self.devices.values() {
            if !autosubscribe.is_empty() {
                port.subscriptions
                    .insert(entry.record.name.clone(), autosubscribe);
            }
        }
        self.sessions.insert(id, port);
        let names: Vec<String> = self.devices.keys().cloned().collect();
        for name in names {
            self.replay_device(id, &name, true);
        }
        debug!(session = %id, %autosubscribe, "local session opened");
        id
    }

    pub fn attach(&mut self, session: SessionId) -> Option<CacheId> {
        let port = self.sessions.get_mut(&session)?;
        Some(*port.cache.get_or_insert(CacheId(session.0)))
    }

    pub fn close_session(&mut self, session: SessionId) -> bool {
        let closed = self.sessions.remove(&session).is_some();
        if closed {
            debug!(session = %session, "local session closed");
        }
        closed
    }

    // ── Devices ─────────────────────────────────────────────────────

    /// Register a device named `prefix.N`, N being the next free ordinal.
    pub fn add_device(&mut self, prefix: &str) -> String {
        let ordinal = self.ordinals.entry(prefix.to_owned()).or_insert(0);
        *ordinal += 1;
        let name = format!("{prefix}.{ordinal}");

        if self.next_port == 0 {
            self.next_port = FIRST_PORT;
        }
        let port = self.next_port;
        self.next_port = self.next_port.wrapping_add(1).max(FIRST_PORT);

        let record = DeviceRecord {
            name: name.clone(),
            host: Some("localhost".into()),
            port: Some(port),
            version: 0,
            state: DeviceState::Ready,
            properties: PropertyMap::new(),
        };
        self.devices.insert(
            name.clone(),
            DeviceEntry {
                record: record.clone(),
                inputs: IndexMap::new(),
                outputs: IndexMap::new(),
            },
        );

        for port in self.sessions.values_mut() {
            if !port.autosubscribe.is_empty() {
                port.subscriptions.insert(name.clone(), port.autosubscribe);
            }
        }
        debug!(device = %name, port, "local device registered");
        self.publish(Change::Upsert(Record::Device(record)));
        name
    }

    pub fn remove_device(&mut self, name: &str) {
        if !self.devices.contains_key(name) {
            return;
        }
        let doomed: Vec<ConnectionId> = self
            .connections
            .keys()
            .filter(|id| id.touches_device(name))
            .cloned()
            .collect();
        for id in doomed {
            self.drop_connection(&id);
        }
        let doomed: Vec<LinkId> = self
            .links
            .keys()
            .filter(|id| id.touches(name))
            .cloned()
            .collect();
        for id in doomed {
            self.drop_link(&id);
        }
        if let Some(entry) = self.devices.shift_remove(name) {
            for sig in entry.signals() {
                self.publish(Change::Remove(EntityKey::Signal(sig.id.clone())));
            }
        }
        for port in self.sessions.values_mut() {
            port.subscriptions.remove(name);
        }
        debug!(device = %name, "local device removed");
        self.publish(Change::Remove(EntityKey::Device(name.to_owned())));
    }

    pub fn set_device_property(&mut self, name: &str, key: &str, value: PropertyValue) {
        let Some(entry) = self.devices.get_mut(name) else {
            return;
        };
        entry.record.properties.insert(key.to_owned(), value);
        let record = entry.record.clone();
        self.publish(Change::Upsert(Record::Device(record)));
    }

    /// Signal names are unique per device across both directions.
    pub fn add_signal(&mut self, device: &str, direction: Direction, spec: SignalSpec) -> Option<SignalId> {
        let entry = self.devices.get_mut(device)?;
        if let Some(existing) = entry.signal(&spec.name) {
            debug!(signal = %existing.id, direction = %existing.direction, "signal name taken; add dropped");
            return None;
        }
        let id = SignalId::new(device, spec.name.clone());
        let record = SignalRecord {
            id: id.clone(),
            direction,
            data_type: spec.data_type,
            length: spec.length,
            unit: spec.unit,
            minimum: spec.minimum,
            maximum: spec.maximum,
            properties: PropertyMap::new(),
        };
        entry.table_mut(direction).insert(spec.name, record.clone());
        entry.record.version += 1;
        let device_record = entry.record.clone();

        trace!(signal = %id, %direction, "local signal added");
        self.publish(Change::Upsert(Record::Signal(record)));
        self.publish(Change::Upsert(Record::Device(device_record)));
        Some(id)
    }

    pub fn remove_signal(&mut self, device: &str, direction: Direction, name: &str) -> bool {
        let Some(entry) = self.devices.get_mut(device) else {
            return false;
        };
        let Some(record) = entry.table_mut(direction).shift_remove(name) else {
            return false;
        };
        entry.record.version += 1;
        let device_record = entry.record.clone();

        let doomed: Vec<ConnectionId> = self
            .connections
            .keys()
            .filter(|id| id.touches_signal(&record.id))
            .cloned()
            .collect();
        for id in doomed {
            self.drop_connection(&id);
        }
        trace!(signal = %record.id, "local signal removed");
        self.publish(Change::Remove(EntityKey::Signal(record.id)));
        self.publish(Change::Upsert(Record::Device(device_record)));
        true
    }

    // ── Requests ────────────────────────────────────────────────────

    pub fn handle(&mut self, session: SessionId, request: Request) {
        trace!(session = %session, op = request.op(), "local request");
        match request {
            Request::Subscribe {
                device,
                flags,
                timeout,
            } => self.subscribe(session, &device, flags, timeout),
            Request::Unsubscribe { device } => {
                if let Some(port) = self.sessions.get_mut(&session) {
                    port.subscriptions.remove(&device);
                }
            }
            Request::SetAutosubscribe { flags } => {
                if let Some(port) = self.sessions.get_mut(&session) {
                    port.autosubscribe = flags;
                }
            }
            Request::Link { id, props } => self.link(id, &props),
            Request::Unlink { id } => {
                if !self.drop_link(&id) {
                    warn!(link = %id, "unlink of unknown link dropped");
                }
            }
            Request::Connect { id, props } => self.connect(id, &props),
            Request::Disconnect { id } => {
                if !self.drop_connection(&id) {
                    warn!(connection = %id, "disconnect of unknown connection dropped");
                }
            }
            Request::ModifyConnection { id, props } => self.modify(&id, &props),
        }
    }

    fn subscribe(
        &mut self,
        session: SessionId,
        device: &str,
        flags: SubscriptionFlags,
        timeout: std::time::Duration,
    ) {
        let Some(port) = self.sessions.get_mut(&session) else {
            return;
        };
        if flags.is_empty() {
            port.subscriptions.remove(device);
            return;
        }
        port.subscriptions.insert(device.to_owned(), flags);
        if self.devices.contains_key(device) {
            debug!(session = %session, device, %flags, ?timeout, "subscription handshake");
            self.replay_device(session, device, false);
        } else {
            debug!(session = %session, device, ?timeout, "subscribed to absent device");
        }
    }

    fn link(&mut self, id: LinkId, props: &LinkProps) {
        if !self.devices.contains_key(&id.source) || !self.devices.contains_key(&id.dest) {
            warn!(link = %id, "link request names an unknown device; dropped");
            return;
        }
        let record = self.links.entry(id.clone()).or_insert_with(|| LinkRecord {
            scopes: vec![id.source.clone()],
            id,
            properties: PropertyMap::new(),
        });
        props.apply_to(record);
        let record = record.clone();
        self.publish(Change::Upsert(Record::Link(record)));
    }

    fn connect(&mut self, id: ConnectionId, props: &ConnectionProps) {
        let source_ok = self
            .signal(&id.source)
            .is_some_and(|s| s.direction == Direction::Output);
        let dest_ok = self
            .signal(&id.dest)
            .is_some_and(|s| s.direction == Direction::Input);
        if !source_ok || !dest_ok {
            warn!(connection = %id, "connect request names an unknown endpoint; dropped");
            return;
        }
        if id.source.device == id.dest.device {
            warn!(connection = %id, "connect request within one device; dropped");
            return;
        }

        let link = id.link();
        if !self.links.contains_key(&link) {
            self.link(link, &LinkProps::default());
        }

        let record = self
            .connections
            .entry(id.clone())
            .or_insert_with(|| ConnectionRecord::with_defaults(id));
        props.apply_to(record);
        let record = record.clone();
        self.publish(Change::Upsert(Record::Connection(record)));
    }

    fn modify(&mut self, id: &ConnectionId, props: &ConnectionProps) {
        let Some(record) = self.connections.get_mut(id) else {
            warn!(connection = %id, "modify of unknown connection dropped");
            return;
        };
        let before = record.clone();
        props.apply_to(record);
        if *record != before {
            let record = record.clone();
            self.publish(Change::Upsert(Record::Connection(record)));
        }
    }

    fn drop_link(&mut self, id: &LinkId) -> bool {
        if !self.links.contains_key(id) {
            return false;
        }
        let doomed: Vec<ConnectionId> = self
            .connections
            .keys()
            .filter(|c| &c.link() == id)
            .cloned()
            .collect();
        for c in doomed {
            self.drop_connection(&c);
        }
        self.links.shift_remove(id);
        self.publish(Change::Remove(EntityKey::Link(id.clone())));
        true
    }

    fn drop_connection(&mut self, id: &ConnectionId) -> bool {
        if self.connections.shift_remove(id).is_none() {
            return false;
        }
        self.publish(Change::Remove(EntityKey::Connection(id.clone())));
        true
    }

    // ── Lookups ─────────────────────────────────────────────────────

    pub fn signal(&self, id: &SignalId) -> Option<&SignalRecord> {
        self.devices.get(&id.device)?.signal(&id.name)
    }

    // ── Publishing ──────────────────────────────────────────────────

    fn publish(&self, change: Change) {
        let update = Update {
            time: TimeTag::now(),
            change,
        };
        let key = update.key();
        for port in self.sessions.values() {
            if port.interested(&key) {
                // Receivers only disappear together with their session.
                let _ = port.tx.send(update.clone());
            }
        }
    }

    /// Send one session the full current state of a device: the device
    /// itself and, if the session follows it, its signals, links and
    /// connections.
    fn replay_device(&self, session: SessionId, device: &str, announce_only: bool) {
        let (Some(port), Some(entry)) = (self.sessions.get(&session), self.devices.get(device))
        else {
            return;
        };
        let now = TimeTag::now();
        let mut out = vec![Update::upsert(now, Record::Device(entry.record.clone()))];
        if !announce_only || port.follows(device) {
            out.extend(
                entry
                    .signals()
                    .map(|s| Update::upsert(now, Record::Signal(s.clone()))),
            );
            out.extend(
                self.links
                    .values()
                    .filter(|l| l.id.touches(device))
                    .map(|l| Update::upsert(now, Record::Link(l.clone()))),
            );
            out.extend(
                self.connections
                    .values()
                    .filter(|c| c.id.touches_device(device))
                    .map(|c| Update::upsert(now, Record::Connection(c.clone()))),
            );
        }
        for update in out {
            let _ = port.tx.send(update);
        }
    }
}
