// ── Signal domain type ──

use serde::{Deserialize, Serialize};

use patchbay_engine::{Direction, PropertyMap, SignalId, SignalType, ValueRange};

/// A signal mirrored into the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub direction: Direction,
    pub data_type: SignalType,
    /// Vector length; 1 for scalars.
    pub length: u32,
    pub unit: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub properties: PropertyMap,
}

impl Signal {
    pub fn device(&self) -> &str {
        &self.id.device
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn is_output(&self) -> bool {
        self.direction == Direction::Output
    }

    /// Declared range when both bounds are known.
    pub fn range(&self) -> Option<ValueRange> {
        Some(ValueRange::new(self.minimum?, self.maximum?))
    }
}
