// ── Devices hosted on a local network ──

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::record::{DeviceRecord, Direction, PropertyValue, SignalId, SignalRecord, SignalType};

use super::topology::NetworkState;

/// Shape of a signal to add to a [`LocalDevice`].
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    pub name: String,
    pub data_type: SignalType,
    pub length: u32,
    pub unit: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl SignalSpec {
    /// A scalar signal with no unit and no range.
    pub fn new(name: impl Into<String>, data_type: SignalType) -> Self {
        let name = name.into();
        let name = name.strip_prefix('/').map(str::to_owned).unwrap_or(name);
        Self {
            name,
            data_type,
            length: 1,
            unit: None,
            minimum: None,
            maximum: None,
        }
    }

    #[must_use]
    pub fn length(mut self, length: u32) -> Self {
        self.length = length.max(1);
        self
    }

    #[must_use]
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    #[must_use]
    pub fn range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }
}

/// A device registered on a [`LocalNetwork`](super::LocalNetwork).
///
/// The device leaves the network, taking its signals, links and
/// connections with it, when this handle is dropped.
pub struct LocalDevice {
    name: String,
    state: Arc<Mutex<NetworkState>>,
}

impl LocalDevice {
    pub(crate) fn new(name: String, state: Arc<Mutex<NetworkState>>) -> Self {
        Self { name, state }
    }

    /// Registered name, `prefix.N`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current device record as the network reports it.
    pub fn record(&self) -> Option<DeviceRecord> {
        self.state
            .lock()
            .devices
            .get(&self.name)
            .map(|d| d.record.clone())
    }

    /// Signal-set version; bumped by every add or remove.
    pub fn version(&self) -> u32 {
        self.record().map_or(0, |r| r.version)
    }

    /// Add an input. Returns `None` if an input of that name exists.
    pub fn add_input(&self, spec: SignalSpec) -> Option<SignalId> {
        self.state
            .lock()
            .add_signal(&self.name, Direction::Input, spec)
    }

    /// Add an output. Returns `None` if an output of that name exists.
    pub fn add_output(&self, spec: SignalSpec) -> Option<SignalId> {
        self.state
            .lock()
            .add_signal(&self.name, Direction::Output, spec)
    }

    pub fn remove_input(&self, name: &str) -> bool {
        self.state
            .lock()
            .remove_signal(&self.name, Direction::Input, trim(name))
    }

    pub fn remove_output(&self, name: &str) -> bool {
        self.state
            .lock()
            .remove_signal(&self.name, Direction::Output, trim(name))
    }

    pub fn num_inputs(&self) -> usize {
        self.count(Direction::Input)
    }

    pub fn num_outputs(&self) -> usize {
        self.count(Direction::Output)
    }

    /// Look up an input by name; a leading `/` is ignored.
    pub fn input(&self, name: &str) -> Option<SignalRecord> {
        self.lookup(Direction::Input, name)
    }

    /// Look up an output by name; a leading `/` is ignored.
    pub fn output(&self, name: &str) -> Option<SignalRecord> {
        self.lookup(Direction::Output, name)
    }

    /// Set a device property and announce the new record.
    pub fn set_property(&self, key: &str, value: impl Into<PropertyValue>) {
        self.state
            .lock()
            .set_device_property(&self.name, key, value.into());
    }

    fn count(&self, direction: Direction) -> usize {
        self.state
            .lock()
            .devices
            .get(&self.name)
            .map_or(0, |d| d.table(direction).len())
    }

    fn lookup(&self, direction: Direction, name: &str) -> Option<SignalRecord> {
        self.state
            .lock()
            .devices
            .get(&self.name)
            .and_then(|d| d.table(direction).get(trim(name)).cloned())
    }
}

impl fmt::Debug for LocalDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalDevice")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Drop for LocalDevice {
    fn drop(&mut self) {
        self.state.lock().remove_device(&self.name);
    }
}

fn trim(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}
