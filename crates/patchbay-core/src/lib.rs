//! Client-side view of a signal-routing network.
//!
//! This crate owns the cache and the event loop that keep a local mirror
//! of a network of devices, signals, links and connections:
//!
//! - **[`Monitor`]**: owns one engine session and exactly one [`Db`].
//!   [`poll()`](Monitor::poll) drains engine activity and dispatches
//!   handlers on the caller's thread; `link`, `connect`,
//!   `connection_modify` and friends hand fire-and-forget requests to the
//!   engine.
//!
//! - **[`Db`]**: the subscription-scoped cache. Classifies every engine
//!   update as NEW / MODIFIED / REMOVED, keeps links and connections out
//!   until both endpoints are cached, and evicts whatever leaves scope.
//!
//! - **Handlers**: one primary callback per entity kind
//!   (`add_device_callback` replaces the previous one) plus any number of
//!   fan-out listeners addressed by [`ListenerId`].
//!
//! - **Domain model** ([`model`]): [`Device`], [`Signal`], [`Link`] and
//!   [`Connection`] snapshots handed to handlers and returned by queries.
//!
//! The network itself is reached only through
//! [`patchbay_engine::SessionEngine`].

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod monitor;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::MonitorConfig;
pub use error::CoreError;
pub use model::{Action, Connection, Device, EntityKind, Link, Signal};
pub use monitor::Monitor;
pub use store::{Db, Handler, ListenerId, handler};

// Engine types callers need to drive a monitor.
pub use patchbay_engine::{
    BoundaryAction, ConnectionMode, ConnectionProps, Direction, LinkProps, SessionEngine,
    SignalId, SignalType, SubscriptionFlags, TimeTag, ValueRange,
};
