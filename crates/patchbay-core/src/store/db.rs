// ── Subscription-scoped topology cache ──
//
// The Db mirrors the part of the network its monitor subscribed to.
// Engine updates are applied one at a time during poll: each is checked
// against the scope table, classified NEW / MODIFIED / REMOVED, stored,
// and dispatched to the handlers for its kind before the next update is
// looked at.
//
// Links and connections whose endpoints are not cached yet wait in a
// waitlist and are delivered NEW once both endpoints resolve. Anything
// leaving the cache takes its dependents with it, dependents first.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use patchbay_engine::{
    CacheId, Change, ConnectionId, DeviceRecord, Direction, EntityKey, LinkId, Record, SignalId,
    SubscriptionFlags, TimeTag, Update,
};

use super::collection::{EntityCollection, Upserted};
use super::listeners::{Handler, ListenerId, Listeners};
use super::scope::ScopeTable;
use crate::convert::device_from_record;
use crate::error::CoreError;
use crate::model::{Action, Connection, Device, Link, Signal};

/// What happens to a dependent whose endpoint leaves the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cascade {
    /// The endpoint is gone from the network; so is the dependent.
    Forget,
    /// The endpoint only left scope; the dependent waits for it again.
    Requeue,
}

/// Local mirror of the subscribed part of the network.
///
/// Owned by exactly one [`Monitor`](crate::Monitor). Cache contents change
/// only inside `Monitor::poll`; handlers registered here run there, on
/// the polling thread.
pub struct Db {
    id: CacheId,
    valid: bool,
    scope: ScopeTable,
    queued_scope: Vec<(String, SubscriptionFlags)>,
    adopted: Vec<String>,

    devices: EntityCollection<String, Device>,
    signals: EntityCollection<SignalId, Signal>,
    links: EntityCollection<LinkId, Link>,
    connections: EntityCollection<ConnectionId, Connection>,

    waiting_links: IndexMap<LinkId, Link>,
    waiting_connections: IndexMap<ConnectionId, Connection>,

    device_handlers: Listeners<Device>,
    signal_handlers: Listeners<Signal>,
    link_handlers: Listeners<Link>,
    connection_handlers: Listeners<Connection>,
    next_listener: u64,
}

impl Db {
    pub(crate) fn new(id: CacheId, autosubscribe: SubscriptionFlags) -> Self {
        Self {
            id,
            valid: true,
            scope: ScopeTable::new(autosubscribe),
            queued_scope: Vec::new(),
            adopted: Vec::new(),
            devices: EntityCollection::new(),
            signals: EntityCollection::new(),
            links: EntityCollection::new(),
            connections: EntityCollection::new(),
            waiting_links: IndexMap::new(),
            waiting_connections: IndexMap::new(),
            device_handlers: Listeners::new(),
            signal_handlers: Listeners::new(),
            link_handlers: Listeners::new(),
            connection_handlers: Listeners::new(),
            next_listener: 0,
        }
    }

    pub fn id(&self) -> CacheId {
        self.id
    }

    /// `false` once the owning monitor has been released.
    pub fn valid(&self) -> bool {
        self.valid
    }

    fn ensure_valid(&self) -> Result<(), CoreError> {
        if self.valid {
            Ok(())
        } else {
            Err(CoreError::InvalidSession)
        }
    }

    fn next_listener_id(&mut self) -> ListenerId {
        self.next_listener += 1;
        ListenerId(self.next_listener)
    }

    // ── Primary callbacks ────────────────────────────────────────────
    //
    // One slot per kind: registering a different handler replaces the
    // current one.

    pub fn add_device_callback(&mut self, handler: Handler<Device>) -> Result<(), CoreError> {
        self.ensure_valid()?;
        if self.device_handlers.set_primary(handler) {
            debug!(cache = %self.id, "device callback replaced");
        }
        Ok(())
    }

    pub fn remove_device_callback(&mut self, handler: &Handler<Device>) -> Result<bool, CoreError> {
        self.ensure_valid()?;
        Ok(self.device_handlers.remove_primary(handler))
    }

    pub fn add_signal_callback(&mut self, handler: Handler<Signal>) -> Result<(), CoreError> {
        self.ensure_valid()?;
        if self.signal_handlers.set_primary(handler) {
            debug!(cache = %self.id, "signal callback replaced");
        }
        Ok(())
    }

    pub fn remove_signal_callback(&mut self, handler: &Handler<Signal>) -> Result<bool, CoreError> {
        self.ensure_valid()?;
        Ok(self.signal_handlers.remove_primary(handler))
    }

    pub fn add_link_callback(&mut self, handler: Handler<Link>) -> Result<(), CoreError> {
        self.ensure_valid()?;
        if self.link_handlers.set_primary(handler) {
            debug!(cache = %self.id, "link callback replaced");
        }
        Ok(())
    }

    pub fn remove_link_callback(&mut self, handler: &Handler<Link>) -> Result<bool, CoreError> {
        self.ensure_valid()?;
        Ok(self.link_handlers.remove_primary(handler))
    }

    pub fn add_connection_callback(&mut self, handler: Handler<Connection>) -> Result<(), CoreError> {
        self.ensure_valid()?;
        if self.connection_handlers.set_primary(handler) {
            debug!(cache = %self.id, "connection callback replaced");
        }
        Ok(())
    }

    pub fn remove_connection_callback(
        &mut self,
        handler: &Handler<Connection>,
    ) -> Result<bool, CoreError> {
        self.ensure_valid()?;
        Ok(self.connection_handlers.remove_primary(handler))
    }

    // ── Fan-out listeners ────────────────────────────────────────────

    pub fn add_device_listener(&mut self, handler: Handler<Device>) -> Result<ListenerId, CoreError> {
        self.ensure_valid()?;
        let id = self.next_listener_id();
        self.device_handlers.add(id, handler);
        Ok(id)
    }

    pub fn add_signal_listener(&mut self, handler: Handler<Signal>) -> Result<ListenerId, CoreError> {
        self.ensure_valid()?;
        let id = self.next_listener_id();
        self.signal_handlers.add(id, handler);
        Ok(id)
    }

    pub fn add_link_listener(&mut self, handler: Handler<Link>) -> Result<ListenerId, CoreError> {
        self.ensure_valid()?;
        let id = self.next_listener_id();
        self.link_handlers.add(id, handler);
        Ok(id)
    }

    pub fn add_connection_listener(
        &mut self,
        handler: Handler<Connection>,
    ) -> Result<ListenerId, CoreError> {
        self.ensure_valid()?;
        let id = self.next_listener_id();
        self.connection_handlers.add(id, handler);
        Ok(id)
    }

    /// Remove a fan-out listener of any kind. Returns whether it existed.
    pub fn remove_listener(&mut self, id: ListenerId) -> Result<bool, CoreError> {
        self.ensure_valid()?;
        Ok(self.device_handlers.remove(id)
            || self.signal_handlers.remove(id)
            || self.link_handlers.remove(id)
            || self.connection_handlers.remove(id))
    }

    /// Total registered handlers across all kinds.
    pub fn handler_count(&self) -> usize {
        self.device_handlers.count()
            + self.signal_handlers.count()
            + self.link_handlers.count()
            + self.connection_handlers.count()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.snapshot()
    }

    pub fn device(&self, name: &str) -> Option<Arc<Device>> {
        self.devices.get(&name.to_owned())
    }

    pub fn signals(&self) -> Vec<Arc<Signal>> {
        self.signals.snapshot()
    }

    /// Signals of one device, optionally restricted to one direction.
    pub fn signals_of(&self, device: &str, direction: Option<Direction>) -> Vec<Arc<Signal>> {
        self.signals
            .values()
            .filter(|s| s.device() == device && direction.is_none_or(|d| s.direction == d))
            .map(Arc::clone)
            .collect()
    }

    pub fn signal(&self, id: &SignalId) -> Option<Arc<Signal>> {
        self.signals.get(id)
    }

    pub fn links(&self) -> Vec<Arc<Link>> {
        self.links.snapshot()
    }

    pub fn link(&self, source: &str, dest: &str) -> Option<Arc<Link>> {
        self.links.get(&LinkId::new(source, dest))
    }

    /// Links with `device` at either end.
    pub fn links_of(&self, device: &str) -> Vec<Arc<Link>> {
        self.links
            .values()
            .filter(|l| l.id.touches(device))
            .map(Arc::clone)
            .collect()
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections.snapshot()
    }

    pub fn connection(&self, source: &SignalId, dest: &SignalId) -> Option<Arc<Connection>> {
        self.connections
            .get(&ConnectionId::new(source.clone(), dest.clone()))
    }

    /// Connections with `signal` at either end.
    pub fn connections_of(&self, signal: &SignalId) -> Vec<Arc<Connection>> {
        self.connections
            .values()
            .filter(|c| c.id.touches_signal(signal))
            .map(Arc::clone)
            .collect()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Links and connections in scope but still waiting for an endpoint.
    pub fn waiting_count(&self) -> usize {
        self.waiting_links.len() + self.waiting_connections.len()
    }

    /// Scope currently applied to `device` (empty if untracked).
    pub fn scope(&self, device: &str) -> SubscriptionFlags {
        self.scope.flags(device)
    }

    /// Every tracked device with its scope.
    pub fn subscriptions(&self) -> Vec<(String, SubscriptionFlags)> {
        self.scope
            .entries()
            .map(|(name, flags)| (name.to_owned(), flags))
            .collect()
    }

    pub fn autosubscribe(&self) -> SubscriptionFlags {
        self.scope.autosubscribe()
    }

    /// Changes whenever cache contents change.
    pub fn revision(&self) -> u64 {
        self.devices.version()
            + self.signals.version()
            + self.links.version()
            + self.connections.version()
    }

    // ── Monitor-facing mutation ──────────────────────────────────────

    /// Record a scope change to apply at the start of the next poll.
    pub(crate) fn queue_scope(&mut self, device: String, flags: SubscriptionFlags) {
        self.queued_scope.push((device, flags));
    }

    pub(crate) fn set_autosubscribe(&mut self, flags: SubscriptionFlags) {
        self.scope.set_autosubscribe(flags);
    }

    /// Devices adopted with the default scope since the last call.
    pub(crate) fn take_adopted(&mut self) -> Vec<String> {
        std::mem::take(&mut self.adopted)
    }

    /// Put back adoptions whose subscribe never reached the engine, ahead
    /// of any adopted since.
    pub(crate) fn restore_adopted(&mut self, devices: impl IntoIterator<Item = String>) {
        let mut pending: Vec<String> = devices.into_iter().collect();
        pending.append(&mut self.adopted);
        self.adopted = pending;
    }

    /// Apply queued scope changes, evicting whatever they stop covering.
    pub(crate) fn apply_queued_scope(&mut self) {
        for (device, flags) in std::mem::take(&mut self.queued_scope) {
            let previous = self.scope.set(&device, flags);
            if previous != flags {
                debug!(cache = %self.id, device = %device, from = %previous, to = %flags, "scope changed");
                self.reconcile(&device);
            }
        }
    }

    /// Apply one engine update: classify, store, dispatch.
    pub(crate) fn apply(&mut self, update: Update) {
        let Update { time, change } = update;
        match change {
            Change::Upsert(Record::Device(r)) => self.upsert_device(r, time),
            Change::Upsert(Record::Signal(r)) => self.upsert_signal(r.into()),
            Change::Upsert(Record::Link(r)) => self.upsert_link(r.into()),
            Change::Upsert(Record::Connection(r)) => self.upsert_connection(r.into()),
            Change::Remove(EntityKey::Device(name)) => self.forget_device(&name),
            Change::Remove(EntityKey::Signal(id)) => self.drop_signal(&id, Cascade::Forget),
            Change::Remove(EntityKey::Link(id)) => {
                self.waiting_links.shift_remove(&id);
                self.drop_link(&id);
            }
            Change::Remove(EntityKey::Connection(id)) => {
                self.waiting_connections.shift_remove(&id);
                self.drop_connection(&id);
            }
        }
    }

    /// Drop every handler and cached entry without notifying anyone.
    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
        self.device_handlers.clear();
        self.signal_handlers.clear();
        self.link_handlers.clear();
        self.connection_handlers.clear();
        self.devices.clear();
        self.signals.clear();
        self.links.clear();
        self.connections.clear();
        self.waiting_links.clear();
        self.waiting_connections.clear();
        self.queued_scope.clear();
        self.adopted.clear();
        self.scope.clear();
    }

    // ── Upserts ──────────────────────────────────────────────────────

    fn upsert_device(&mut self, record: DeviceRecord, time: TimeTag) {
        let name = record.name.clone();
        if self.scope.adopt(&name) {
            debug!(cache = %self.id, device = %name, flags = %self.scope.flags(&name), "adopted device");
            self.adopted.push(name.clone());
        }
        // Scope only narrows in `reconcile`, so a cached device is covered.
        if !self.scope.covers_device(&name) {
            return;
        }

        let device = device_from_record(record, time);
        match self
            .devices
            .upsert(name.clone(), device.clone(), Device::same_attributes)
        {
            Upserted::Inserted(d) => {
                self.notify_device(&d, Action::New);
                self.promote_waiting();
            }
            Upserted::Replaced(d) => self.notify_device(&d, Action::Modified),
            Upserted::Unchanged => self.devices.store_quiet(name, device),
        }
    }

    fn upsert_signal(&mut self, signal: Signal) {
        if self
            .signals
            .get(&signal.id)
            .is_some_and(|cached| cached.direction != signal.direction)
        {
            debug!(cache = %self.id, signal = %signal.id, direction = %signal.direction, "signal name already cached in the other direction; ignored");
            return;
        }
        if !self.scope.covers_signal(&signal.id, signal.direction) {
            let id = signal.id;
            if self.signals.contains(&id) {
                self.drop_signal(&id, Cascade::Requeue);
            }
            return;
        }
        match self.signals.upsert(signal.id.clone(), signal, |a, b| a == b) {
            Upserted::Inserted(s) => {
                self.notify_signal(&s, Action::New);
                self.promote_waiting();
            }
            Upserted::Replaced(s) => self.notify_signal(&s, Action::Modified),
            Upserted::Unchanged => {}
        }
    }

    fn upsert_link(&mut self, link: Link) {
        let id = link.id.clone();
        if !self.scope.covers_link(&id) {
            self.waiting_links.shift_remove(&id);
            self.drop_link(&id);
            return;
        }
        if !self.link_resolved(&id) {
            trace!(cache = %self.id, link = %id, "link waiting for endpoints");
            self.waiting_links.insert(id, link);
            return;
        }
        self.waiting_links.shift_remove(&id);
        self.store_link(link);
    }

    fn upsert_connection(&mut self, connection: Connection) {
        let id = connection.id.clone();
        if !self.scope.covers_connection(&id) {
            self.waiting_connections.shift_remove(&id);
            self.drop_connection(&id);
            return;
        }
        if !self.connection_resolved(&id) {
            trace!(cache = %self.id, connection = %id, "connection waiting for endpoints");
            self.waiting_connections.insert(id, connection);
            return;
        }
        self.waiting_connections.shift_remove(&id);
        self.store_connection(connection);
    }

    fn store_link(&mut self, link: Link) {
        match self.links.upsert(link.id.clone(), link, |a, b| a == b) {
            Upserted::Inserted(l) => self.notify_link(&l, Action::New),
            Upserted::Replaced(l) => self.notify_link(&l, Action::Modified),
            Upserted::Unchanged => {}
        }
    }

    fn store_connection(&mut self, connection: Connection) {
        match self
            .connections
            .upsert(connection.id.clone(), connection, |a, b| a == b)
        {
            Upserted::Inserted(c) => self.notify_connection(&c, Action::New),
            Upserted::Replaced(c) => self.notify_connection(&c, Action::Modified),
            Upserted::Unchanged => {}
        }
    }

    fn link_resolved(&self, id: &LinkId) -> bool {
        self.devices.contains(&id.source) && self.devices.contains(&id.dest)
    }

    fn connection_resolved(&self, id: &ConnectionId) -> bool {
        self.signals.contains(&id.source) && self.signals.contains(&id.dest)
    }

    /// Move every waiting entry whose endpoints are now cached into the
    /// cache.
    fn promote_waiting(&mut self) {
        let ready: Vec<LinkId> = self
            .waiting_links
            .keys()
            .filter(|id| self.link_resolved(id))
            .cloned()
            .collect();
        for id in ready {
            if let Some(link) = self.waiting_links.shift_remove(&id) {
                trace!(cache = %self.id, link = %id, "link endpoints resolved");
                self.store_link(link);
            }
        }

        let ready: Vec<ConnectionId> = self
            .waiting_connections
            .keys()
            .filter(|id| self.connection_resolved(id))
            .cloned()
            .collect();
        for id in ready {
            if let Some(connection) = self.waiting_connections.shift_remove(&id) {
                trace!(cache = %self.id, connection = %id, "connection endpoints resolved");
                self.store_connection(connection);
            }
        }
    }

    // ── Removals ─────────────────────────────────────────────────────

    /// The device left the network: drop it with everything hanging off it.
    fn forget_device(&mut self, name: &str) {
        self.waiting_connections
            .retain(|id, _| !id.touches_device(name));
        self.waiting_links.retain(|id, _| !id.touches(name));

        for id in self.connections.keys_where(|id, _| id.touches_device(name)) {
            self.drop_connection(&id);
        }
        for id in self.links.keys_where(|id, _| id.touches(name)) {
            self.drop_link(&id);
        }
        for id in self.signals.keys_where(|id, _| id.device == name) {
            self.drop_signal(&id, Cascade::Forget);
        }
        if let Some(d) = self.devices.remove(&name.to_owned()) {
            self.notify_device(&d, Action::Removed);
        }
        self.adopted.retain(|d| d != name);
        if self.scope.forget(name) {
            debug!(cache = %self.id, device = name, "adopted scope dropped with device");
        }
    }

    /// The device left scope: its links wait for it again if still in scope.
    /// Only called from `reconcile`, which has already settled the device's
    /// signals and connections against their own scope bits.
    fn evict_device(&mut self, name: &str) {
        for id in self.links.keys_where(|id, _| id.touches(name)) {
            if let Some(l) = self.links.remove(&id) {
                self.notify_link(&l, Action::Removed);
                if self.scope.covers_link(&id) {
                    self.waiting_links.insert(id, (*l).clone());
                }
            }
        }
        if let Some(d) = self.devices.remove(&name.to_owned()) {
            debug!(cache = %self.id, device = name, "device left scope");
            self.notify_device(&d, Action::Removed);
        }
    }

    fn drop_signal(&mut self, signal: &SignalId, cascade: Cascade) {
        if cascade == Cascade::Forget {
            self.waiting_connections
                .retain(|id, _| !id.touches_signal(signal));
        }
        for id in self.connections.keys_where(|id, _| id.touches_signal(signal)) {
            if let Some(c) = self.connections.remove(&id) {
                self.notify_connection(&c, Action::Removed);
                if cascade == Cascade::Requeue && self.scope.covers_connection(&id) {
                    self.waiting_connections.insert(id, (*c).clone());
                }
            }
        }
        if let Some(s) = self.signals.remove(signal) {
            self.notify_signal(&s, Action::Removed);
        }
    }

    fn drop_link(&mut self, id: &LinkId) {
        if let Some(l) = self.links.remove(id) {
            self.notify_link(&l, Action::Removed);
        }
    }

    fn drop_connection(&mut self, id: &ConnectionId) {
        if let Some(c) = self.connections.remove(id) {
            self.notify_connection(&c, Action::Removed);
        }
    }

    /// Evict whatever touching `device` the current scope no longer covers.
    fn reconcile(&mut self, device: &str) {
        self.waiting_connections
            .retain(|id, _| !id.touches_device(device) || self.scope.covers_connection(id));
        self.waiting_links
            .retain(|id, _| !id.touches(device) || self.scope.covers_link(id));

        let scope = &self.scope;
        let stale = self
            .connections
            .keys_where(|id, _| id.touches_device(device) && !scope.covers_connection(id));
        for id in stale {
            self.drop_connection(&id);
        }

        let scope = &self.scope;
        let stale = self
            .links
            .keys_where(|id, _| id.touches(device) && !scope.covers_link(id));
        for id in stale {
            self.drop_link(&id);
        }

        let scope = &self.scope;
        let stale = self
            .signals
            .keys_where(|id, s| id.device == device && !scope.covers_signal(id, s.direction));
        for id in stale {
            self.drop_signal(&id, Cascade::Requeue);
        }

        if self.devices.contains(&device.to_owned()) && !self.scope.covers_device(device) {
            self.evict_device(device);
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    fn notify_device(&self, device: &Device, action: Action) {
        trace!(cache = %self.id, device = %device.name, %action, "device change");
        self.device_handlers.dispatch(device, action);
    }

    fn notify_signal(&self, signal: &Signal, action: Action) {
        trace!(cache = %self.id, signal = %signal.id, %action, "signal change");
        self.signal_handlers.dispatch(signal, action);
    }

    fn notify_link(&self, link: &Link, action: Action) {
        trace!(cache = %self.id, link = %link.id, %action, "link change");
        self.link_handlers.dispatch(link, action);
    }

    fn notify_connection(&self, connection: &Connection, action: Action) {
        trace!(cache = %self.id, connection = %connection.id, %action, "connection change");
        self.connection_handlers.dispatch(connection, action);
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("id", &self.id)
            .field("valid", &self.valid)
            .field("devices", &self.devices.len())
            .field("signals", &self.signals.len())
            .field("links", &self.links.len())
            .field("connections", &self.connections.len())
            .field("waiting", &self.waiting_count())
            .finish_non_exhaustive()
    }
}
