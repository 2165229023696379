// ── Change handlers ──
//
// One primary slot per entity kind (replace-on-register) plus any number
// of fan-out listeners addressed by id. Dispatch order: primary first,
// then listeners in registration order.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::Action;

/// A change handler: receives the cached snapshot and what happened to it.
pub type Handler<T> = Arc<dyn Fn(&T, Action) + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<T, F>(f: F) -> Handler<T>
where
    F: Fn(&T, Action) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Identifies a fan-out listener for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

pub(crate) struct Listeners<T> {
    primary: Option<Handler<T>>,
    extra: Vec<(ListenerId, Handler<T>)>,
}

impl<T> Listeners<T> {
    pub(crate) fn new() -> Self {
        Self {
            primary: None,
            extra: Vec::new(),
        }
    }

    /// Install `handler` in the primary slot. Returns `true` if a
    /// different handler was displaced.
    pub(crate) fn set_primary(&mut self, handler: Handler<T>) -> bool {
        match self.primary.replace(handler) {
            Some(old) => self
                .primary
                .as_ref()
                .is_some_and(|new| !Arc::ptr_eq(&old, new)),
            None => false,
        }
    }

    /// Clear the primary slot if it holds `handler`.
    pub(crate) fn remove_primary(&mut self, handler: &Handler<T>) -> bool {
        if self.primary.as_ref().is_some_and(|h| Arc::ptr_eq(h, handler)) {
            self.primary = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn add(&mut self, id: ListenerId, handler: Handler<T>) {
        self.extra.push((id, handler));
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.extra.len();
        self.extra.retain(|(i, _)| *i != id);
        self.extra.len() != before
    }

    pub(crate) fn dispatch(&self, entity: &T, action: Action) {
        if let Some(primary) = &self.primary {
            primary(entity, action);
        }
        for (_, listener) in &self.extra {
            listener(entity, action);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.primary = None;
        self.extra.clear();
    }

    pub(crate) fn count(&self) -> usize {
        usize::from(self.primary.is_some()) + self.extra.len()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    fn recorder(tag: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Handler<u32> {
        let log = Arc::clone(log);
        handler(move |v: &u32, a| log.lock().push(format!("{tag}:{v}:{a}")))
    }

    #[test]
    fn second_primary_displaces_the_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut l = Listeners::new();
        let first = recorder("first", &log);
        assert!(!l.set_primary(Arc::clone(&first)));
        assert!(!l.set_primary(Arc::clone(&first)), "same handler is not a displacement");
        assert!(l.set_primary(recorder("second", &log)));

        l.dispatch(&7, Action::New);
        assert_eq!(*log.lock(), vec!["second:7:new"]);
        assert!(!l.remove_primary(&first));
        assert_eq!(l.count(), 1);
    }

    #[test]
    fn listeners_run_after_primary_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut l = Listeners::new();
        l.add(ListenerId(1), recorder("a", &log));
        l.set_primary(recorder("p", &log));
        l.add(ListenerId(2), recorder("b", &log));

        l.dispatch(&1, Action::Modified);
        assert_eq!(
            *log.lock(),
            vec!["p:1:modified", "a:1:modified", "b:1:modified"]
        );

        assert!(l.remove(ListenerId(1)));
        assert!(!l.remove(ListenerId(1)));
        assert_eq!(l.count(), 2);
        l.clear();
        assert_eq!(l.count(), 0);
    }
}
