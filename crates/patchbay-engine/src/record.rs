// ── Topology records exchanged with the engine ──
//
// Identities (`SignalId`, `LinkId`, `ConnectionId`), the metadata records
// the engine reports for each entity kind, and the `Update` envelope that
// `SessionEngine::drain` yields.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::timetag::TimeTag;

// ── Properties ──────────────────────────────────────────────────────

/// A single opaque property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<PropertyValue>),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for PropertyValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Ordered key/value metadata bag. Encoding is the engine's concern.
pub type PropertyMap = IndexMap<String, PropertyValue>;

// ── Identities ──────────────────────────────────────────────────────

/// Malformed entity identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("signal identity '{0}' must look like 'device/signal'")]
    MalformedSignal(String),

    #[error("device name must not be empty")]
    EmptyDevice,
}

/// Strip one leading `/` from a name, as peers may or may not send it.
fn trim_slash(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

/// Normalize a device name: no leading slash, no surrounding whitespace.
pub fn normalize_device_name(name: &str) -> Result<String, IdentityError> {
    let trimmed = trim_slash(name.trim());
    if trimmed.is_empty() {
        return Err(IdentityError::EmptyDevice);
    }
    Ok(trimmed.to_owned())
}

/// Fully qualified signal identity: owning device plus signal name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalId {
    pub device: String,
    pub name: String,
}

impl SignalId {
    pub fn new(device: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.name)
    }
}

impl FromStr for SignalId {
    type Err = IdentityError;

    /// Parse `"device/signal"` (a leading `/` is tolerated). Everything after
    /// the first separator belongs to the signal name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = trim_slash(s.trim());
        let (device, name) = body
            .split_once('/')
            .ok_or_else(|| IdentityError::MalformedSignal(s.to_owned()))?;
        if device.is_empty() || name.is_empty() {
            return Err(IdentityError::MalformedSignal(s.to_owned()));
        }
        Ok(Self::new(device, name))
    }
}

/// Ordered device pair identifying a link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId {
    pub source: String,
    pub dest: String,
}

impl LinkId {
    pub fn new(source: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
        }
    }

    pub fn touches(&self, device: &str) -> bool {
        self.source == device || self.dest == device
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.dest)
    }
}

/// Ordered signal pair identifying a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId {
    pub source: SignalId,
    pub dest: SignalId,
}

impl ConnectionId {
    pub fn new(source: SignalId, dest: SignalId) -> Self {
        Self { source, dest }
    }

    pub fn touches_signal(&self, signal: &SignalId) -> bool {
        &self.source == signal || &self.dest == signal
    }

    pub fn touches_device(&self, device: &str) -> bool {
        self.source.device == device || self.dest.device == device
    }

    /// The device-level link this connection travels over.
    pub fn link(&self) -> LinkId {
        LinkId::new(self.source.device.clone(), self.dest.device.clone())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.dest)
    }
}

// ── Enumerations ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

/// Element type carried by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SignalType {
    #[strum(to_string = "int32", serialize = "i")]
    Int32,
    #[strum(to_string = "float", serialize = "f")]
    Float,
    #[strum(to_string = "double", serialize = "d")]
    Double,
}

/// Registration state of a device on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceState {
    /// Still negotiating its name and port.
    Registering,
    Ready,
}

/// How a connection transforms values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionMode {
    Bypass,
    #[default]
    Linear,
    Expression,
    Calibrate,
    Reverse,
}

/// What happens to values outside a connection's destination range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BoundaryAction {
    #[default]
    None,
    Mute,
    Clamp,
    Fold,
    Wrap,
}

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

// ── Records ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub name: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Bumped by the device every time its signal set changes.
    pub version: u32,
    pub state: DeviceState,
    #[serde(default)]
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: SignalId,
    pub direction: Direction,
    pub data_type: SignalType,
    pub length: u32,
    pub unit: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    #[serde(default)]
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: LinkId,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub mode: ConnectionMode,
    pub expression: Option<String>,
    pub bound_min: BoundaryAction,
    pub bound_max: BoundaryAction,
    pub source_range: Option<ValueRange>,
    pub dest_range: Option<ValueRange>,
    pub muted: bool,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl ConnectionRecord {
    /// A connection with engine defaults for every routing property.
    pub fn with_defaults(id: ConnectionId) -> Self {
        Self {
            id,
            mode: ConnectionMode::default(),
            expression: None,
            bound_min: BoundaryAction::default(),
            bound_max: BoundaryAction::default(),
            source_range: None,
            dest_range: None,
            muted: false,
            properties: PropertyMap::new(),
        }
    }
}

/// One entity's metadata as reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Device(DeviceRecord),
    Signal(SignalRecord),
    Link(LinkRecord),
    Connection(ConnectionRecord),
}

impl Record {
    pub fn key(&self) -> EntityKey {
        match self {
            Self::Device(d) => EntityKey::Device(d.name.clone()),
            Self::Signal(s) => EntityKey::Signal(s.id.clone()),
            Self::Link(l) => EntityKey::Link(l.id.clone()),
            Self::Connection(c) => EntityKey::Connection(c.id.clone()),
        }
    }
}

/// Identity of any cached entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum EntityKey {
    Device(String),
    Signal(SignalId),
    Link(LinkId),
    Connection(ConnectionId),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(name) => write!(f, "device {name}"),
            Self::Signal(id) => write!(f, "signal {id}"),
            Self::Link(id) => write!(f, "link {id}"),
            Self::Connection(id) => write!(f, "connection {id}"),
        }
    }
}

/// What the engine observed about one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "entity", rename_all = "lowercase")]
pub enum Change {
    /// The entity exists with this metadata.
    Upsert(Record),
    /// The entity is gone from the network.
    Remove(EntityKey),
}

/// A change stamped with the engine time it was observed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub time: TimeTag,
    pub change: Change,
}

impl Update {
    pub fn upsert(time: TimeTag, record: Record) -> Self {
        Self {
            time,
            change: Change::Upsert(record),
        }
    }

    pub fn remove(time: TimeTag, key: EntityKey) -> Self {
        Self {
            time,
            change: Change::Remove(key),
        }
    }

    pub fn key(&self) -> EntityKey {
        match &self.change {
            Change::Upsert(record) => record.key(),
            Change::Remove(key) => key.clone(),
        }
    }
}
