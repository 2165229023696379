// ── Device domain type ──

use serde::{Deserialize, Serialize};

use patchbay_engine::{DeviceState, PropertyMap, PropertyValue, TimeTag};

/// A device mirrored into the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Signal-set version reported by the device.
    pub version: u32,
    pub state: DeviceState,
    pub properties: PropertyMap,
    /// Engine time of the last metadata update. Not an attribute: a new
    /// stamp alone never makes a device MODIFIED.
    pub synced: TimeTag,
}

impl Device {
    pub fn is_ready(&self) -> bool {
        self.state == DeviceState::Ready
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Attribute equality, ignoring the sync stamp.
    pub fn same_attributes(&self, other: &Self) -> bool {
        self.name == other.name
            && self.host == other.host
            && self.port == other.port
            && self.version == other.version
            && self.state == other.state
            && self.properties == other.properties
    }
}
