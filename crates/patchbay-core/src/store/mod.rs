// ── Cache storage ──

pub(crate) mod collection;
pub mod db;
pub mod listeners;
pub(crate) mod scope;

pub use db::Db;
pub use listeners::{Handler, ListenerId, handler};
