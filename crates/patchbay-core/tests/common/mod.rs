// Shared helpers for the monitor integration tests.

#![allow(clippy::unwrap_used, dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use patchbay_core::{Action, Connection, Db, Device, Link, Signal, handler};

pub const DEADLINE: Duration = Duration::from_secs(2);

/// Every handler invocation as `"<kind> <identity> <action>"`.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    /// Register primary callbacks for all four kinds on `db`.
    pub fn attach(db: &mut Db) -> Self {
        let events = Self::default();
        let e = events.clone();
        db.add_device_callback(handler(move |d: &Device, a: Action| {
            e.push(format!("device {} {a}", d.name));
        }))
        .unwrap();
        let e = events.clone();
        db.add_signal_callback(handler(move |s: &Signal, a: Action| {
            e.push(format!("signal {} {a}", s.id));
        }))
        .unwrap();
        let e = events.clone();
        db.add_link_callback(handler(move |l: &Link, a: Action| {
            e.push(format!("link {} {a}", l.id));
        }))
        .unwrap();
        let e = events.clone();
        db.add_connection_callback(handler(move |c: &Connection, a: Action| {
            e.push(format!("connection {} {a}", c.id));
        }))
        .unwrap();
        events
    }

    fn push(&self, line: String) {
        self.0.lock().push(line);
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}
