// ── Domain model ──
//
// Canonical cached entities. Every type is a snapshot: handlers receive a
// reference to the value as cached at dispatch time.

pub mod connection;
pub mod device;
pub mod link;
pub mod signal;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use connection::Connection;
pub use device::Device;
pub use link::Link;
pub use signal::Signal;

/// How a cache entry changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    /// First time the entity is cached.
    New,
    /// A cached entity's attributes changed.
    Modified,
    /// The entity left the cache.
    Removed,
}

/// Entity kinds the cache tracks, one notification slot each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
    Device,
    Signal,
    Link,
    Connection,
}
