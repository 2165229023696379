// ── Connection domain type ──

use serde::{Deserialize, Serialize};

use patchbay_engine::{BoundaryAction, ConnectionId, ConnectionMode, PropertyMap, SignalId, ValueRange};

/// A signal-to-signal connection mirrored into the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub mode: ConnectionMode,
    pub expression: Option<String>,
    pub bound_min: BoundaryAction,
    pub bound_max: BoundaryAction,
    pub source_range: Option<ValueRange>,
    pub dest_range: Option<ValueRange>,
    pub muted: bool,
    pub properties: PropertyMap,
}

impl Connection {
    pub fn source(&self) -> &SignalId {
        &self.id.source
    }

    pub fn dest(&self) -> &SignalId {
        &self.id.dest
    }
}
