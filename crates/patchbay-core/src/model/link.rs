// ── Link domain type ──

use serde::{Deserialize, Serialize};

use patchbay_engine::{LinkId, PropertyMap};

/// A device-to-device link mirrored into the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub scopes: Vec<String>,
    pub properties: PropertyMap,
}

impl Link {
    pub fn source(&self) -> &str {
        &self.id.source
    }

    pub fn dest(&self) -> &str {
        &self.id.dest
    }
}
