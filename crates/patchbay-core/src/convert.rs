// ── Record-to-domain conversions ──
//
// Bridges engine records into `patchbay_core::model` types. Conversions
// normalize what peers are sloppy about: blank units, non-finite bounds,
// duplicated link scopes.

use patchbay_engine::{ConnectionRecord, DeviceRecord, LinkRecord, SignalRecord, TimeTag};

use crate::model::{Connection, Device, Link, Signal};

// ── Helpers ────────────────────────────────────────────────────────

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

fn finite(raw: Option<f64>) -> Option<f64> {
    raw.filter(|x| x.is_finite())
}

// ── Conversions ────────────────────────────────────────────────────

/// A cached device stamped with the engine time it was observed at.
pub fn device_from_record(record: DeviceRecord, synced: TimeTag) -> Device {
    Device {
        name: record.name,
        host: non_blank(record.host),
        port: record.port,
        version: record.version,
        state: record.state,
        properties: record.properties,
        synced,
    }
}

impl From<SignalRecord> for Signal {
    fn from(r: SignalRecord) -> Self {
        Self {
            id: r.id,
            direction: r.direction,
            data_type: r.data_type,
            length: r.length.max(1),
            unit: non_blank(r.unit),
            minimum: finite(r.minimum),
            maximum: finite(r.maximum),
            properties: r.properties,
        }
    }
}

impl From<LinkRecord> for Link {
    fn from(r: LinkRecord) -> Self {
        let mut scopes: Vec<String> = Vec::with_capacity(r.scopes.len());
        for scope in r.scopes {
            if !scope.is_empty() && !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        Self {
            id: r.id,
            scopes,
            properties: r.properties,
        }
    }
}

impl From<ConnectionRecord> for Connection {
    fn from(r: ConnectionRecord) -> Self {
        Self {
            id: r.id,
            mode: r.mode,
            expression: non_blank(r.expression),
            bound_min: r.bound_min,
            bound_max: r.bound_max,
            source_range: r.source_range,
            dest_range: r.dest_range,
            muted: r.muted,
            properties: r.properties,
        }
    }
}
