// patchbay-engine: the session engine boundary consumed by patchbay-core
//
// Everything the monitor knows about the network arrives through the
// `SessionEngine` trait: open/attach/close a session, drain pending
// updates with a bounded wait, submit fire-and-forget requests, and ask
// for the engine clock. `LocalNetwork` is a complete in-process engine
// used by the CLI and the integration tests.

pub mod error;
pub mod flags;
pub mod local;
pub mod record;
pub mod request;
pub mod session;
pub mod timetag;

pub use error::EngineError;
pub use flags::{FlagParseError, SubscriptionFlags};
pub use local::{LocalDevice, LocalEngine, LocalNetwork, SignalSpec};
pub use record::{
    BoundaryAction, Change, ConnectionId, ConnectionMode, ConnectionRecord, DeviceRecord,
    DeviceState, Direction, EntityKey, IdentityError, LinkId, LinkRecord, PropertyMap,
    PropertyValue, Record, SignalId, SignalRecord, SignalType, Update, ValueRange,
    normalize_device_name,
};
pub use request::{ConnectionProps, LinkProps, Request};
pub use session::{CacheId, SessionEngine, SessionId};
pub use timetag::TimeTag;
