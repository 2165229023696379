// ── Fire-and-forget topology requests ──
//
// Every mutation a session can ask of the network. Requests carry no id
// and produce no reply; their effect, if any, comes back later as an
// `Update` through `drain`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::flags::SubscriptionFlags;
use crate::record::{
    BoundaryAction, ConnectionId, ConnectionMode, ConnectionRecord, LinkId, LinkRecord,
    PropertyMap, ValueRange,
};

// ── Link ───────────────────────────────────────────────────────────

/// Optional link parameters. Absent fields keep engine defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub extra: PropertyMap,
}

impl LinkProps {
    /// Overlay these properties onto an existing link record.
    pub fn apply_to(&self, record: &mut LinkRecord) {
        if let Some(ref scopes) = self.scopes {
            record.scopes.clone_from(scopes);
        }
        for (k, v) in &self.extra {
            record.properties.insert(k.clone(), v.clone());
        }
    }
}

// ── Connection ─────────────────────────────────────────────────────

/// Optional connection parameters. Absent fields keep engine defaults
/// on connect, or their current value on modify.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ConnectionMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_min: Option<BoundaryAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_max: Option<BoundaryAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_range: Option<ValueRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_range: Option<ValueRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub extra: PropertyMap,
}

impl ConnectionProps {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlay these properties onto an existing connection record.
    pub fn apply_to(&self, record: &mut ConnectionRecord) {
        if let Some(mode) = self.mode {
            record.mode = mode;
        }
        if let Some(ref expr) = self.expression {
            record.expression = Some(expr.clone());
        }
        if let Some(b) = self.bound_min {
            record.bound_min = b;
        }
        if let Some(b) = self.bound_max {
            record.bound_max = b;
        }
        if let Some(r) = self.source_range {
            record.source_range = Some(r);
        }
        if let Some(r) = self.dest_range {
            record.dest_range = Some(r);
        }
        if let Some(m) = self.muted {
            record.muted = m;
        }
        for (k, v) in &self.extra {
            record.properties.insert(k.clone(), v.clone());
        }
    }
}

// ── Request ────────────────────────────────────────────────────────

/// A mutation handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Subscribe {
        device: String,
        flags: SubscriptionFlags,
        /// Handshake window / lease requested for the subscription.
        timeout: Duration,
    },
    Unsubscribe {
        device: String,
    },
    SetAutosubscribe {
        flags: SubscriptionFlags,
    },
    Link {
        id: LinkId,
        props: LinkProps,
    },
    Unlink {
        id: LinkId,
    },
    Connect {
        id: ConnectionId,
        props: ConnectionProps,
    },
    Disconnect {
        id: ConnectionId,
    },
    ModifyConnection {
        id: ConnectionId,
        props: ConnectionProps,
    },
}

impl Request {
    /// Short operation name for logs.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::SetAutosubscribe { .. } => "set_autosubscribe",
            Self::Link { .. } => "link",
            Self::Unlink { .. } => "unlink",
            Self::Connect { .. } => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::ModifyConnection { .. } => "modify_connection",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::SignalId;

    fn conn_id() -> ConnectionId {
        ConnectionId::new(SignalId::new("a", "out"), SignalId::new("b", "in"))
    }

    #[test]
    fn connection_props_overlay_only_present_fields() {
        let mut record = ConnectionRecord::with_defaults(conn_id());
        record.muted = true;

        let props = ConnectionProps {
            mode: Some(ConnectionMode::Expression),
            expression: Some("y = x * 2".into()),
            bound_max: Some(BoundaryAction::Clamp),
            ..ConnectionProps::default()
        };
        props.apply_to(&mut record);

        assert_eq!(record.mode, ConnectionMode::Expression);
        assert_eq!(record.expression.as_deref(), Some("y = x * 2"));
        assert_eq!(record.bound_min, BoundaryAction::None);
        assert_eq!(record.bound_max, BoundaryAction::Clamp);
        assert!(record.muted, "absent field must keep its current value");
    }

    #[test]
    fn empty_props_serialize_to_empty_object() {
        let json = serde_json::to_string(&ConnectionProps::default()).unwrap();
        assert_eq!(json, "{}");
        assert!(ConnectionProps::default().is_empty());
    }

    #[test]
    fn link_props_replace_scopes_and_merge_extra() {
        let mut record = LinkRecord {
            id: LinkId::new("a", "b"),
            scopes: vec!["a".into()],
            properties: PropertyMap::new(),
        };
        let mut extra = PropertyMap::new();
        extra.insert("latency".into(), 5_i64.into());
        LinkProps {
            scopes: Some(vec!["a".into(), "b".into()]),
            extra,
        }
        .apply_to(&mut record);

        assert_eq!(record.scopes, vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(record.properties["latency"], crate::record::PropertyValue::Int(5));
    }

    #[test]
    fn request_op_names() {
        let r = Request::Disconnect { id: conn_id() };
        assert_eq!(r.op(), "disconnect");
    }
}
