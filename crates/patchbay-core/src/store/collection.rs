// ── Generic keyed entity collection ──
//
// Insertion-ordered storage with O(1) lookups. Entities are held behind
// `Arc` so dispatch and query snapshots never copy the payload.

use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;

/// Outcome of [`EntityCollection::upsert`].
#[derive(Debug)]
pub(crate) enum Upserted<T> {
    /// The key was not present.
    Inserted(Arc<T>),
    /// The key was present with different content.
    Replaced(Arc<T>),
    /// The key was present with equal content; nothing was stored.
    Unchanged,
}

/// Storage for a single entity type, keyed by its identity.
///
/// Every mutation bumps a version counter so callers can cheaply detect
/// whether anything changed between two points.
pub(crate) struct EntityCollection<K, T> {
    by_key: IndexMap<K, Arc<T>>,
    version: u64,
}

impl<K: Hash + Eq + Clone, T> EntityCollection<K, T> {
    pub(crate) fn new() -> Self {
        Self {
            by_key: IndexMap::new(),
            version: 0,
        }
    }

    /// Insert or update an entity. `same` decides whether an existing
    /// entry already carries the new content.
    pub(crate) fn upsert(
        &mut self,
        key: K,
        entity: T,
        same: impl Fn(&T, &T) -> bool,
    ) -> Upserted<T> {
        let existed = match self.by_key.get(&key) {
            Some(old) if same(&**old, &entity) => return Upserted::Unchanged,
            Some(_) => true,
            None => false,
        };
        let entity = Arc::new(entity);
        self.by_key.insert(key, Arc::clone(&entity));
        self.version += 1;
        if existed {
            Upserted::Replaced(entity)
        } else {
            Upserted::Inserted(entity)
        }
    }

    /// Store an entity without counting it as a change (bookkeeping
    /// fields such as sync stamps).
    pub(crate) fn store_quiet(&mut self, key: K, entity: T) {
        self.by_key.insert(key, Arc::new(entity));
    }

    /// Remove an entity by key. Returns the removed entity if it existed.
    pub(crate) fn remove(&mut self, key: &K) -> Option<Arc<T>> {
        let removed = self.by_key.shift_remove(key);
        if removed.is_some() {
            self.version += 1;
        }
        removed
    }

    pub(crate) fn get(&self, key: &K) -> Option<Arc<T>> {
        self.by_key.get(key).map(Arc::clone)
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.by_key.contains_key(key)
    }

    /// Current values in insertion order (cheap `Arc` clones).
    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        self.by_key.values().map(Arc::clone).collect()
    }

    /// Keys matching a predicate, in insertion order.
    pub(crate) fn keys_where(&self, mut pred: impl FnMut(&K, &T) -> bool) -> Vec<K> {
        self.by_key
            .iter()
            .filter(|(k, v)| pred(k, v))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Arc<T>> {
        self.by_key.values()
    }

    /// Remove all entities without reporting them.
    pub(crate) fn clear(&mut self) {
        if !self.by_key.is_empty() {
            self.by_key.clear();
            self.version += 1;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[allow(clippy::ptr_arg)]
    fn eq(a: &String, b: &String) -> bool {
        a == b
    }

    #[test]
    fn upsert_distinguishes_new_changed_and_identical() {
        let mut col: EntityCollection<&str, String> = EntityCollection::new();
        assert!(matches!(col.upsert("k", "a".into(), eq), Upserted::Inserted(_)));
        assert!(matches!(col.upsert("k", "a".into(), eq), Upserted::Unchanged));
        assert!(matches!(col.upsert("k", "b".into(), eq), Upserted::Replaced(_)));
        assert_eq!(*col.get(&"k").unwrap(), "b");
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn unchanged_upsert_does_not_bump_version() {
        let mut col: EntityCollection<u8, String> = EntityCollection::new();
        col.upsert(1, "x".into(), eq);
        let v = col.version();
        col.upsert(1, "x".into(), eq);
        assert_eq!(col.version(), v);
        col.remove(&1);
        assert!(col.version() > v);
    }

    #[test]
    fn remove_returns_last_value() {
        let mut col: EntityCollection<u8, String> = EntityCollection::new();
        col.upsert(1, "x".into(), eq);
        assert_eq!(*col.remove(&1).unwrap(), "x");
        assert!(col.remove(&1).is_none());
        assert!(!col.contains(&1));
    }

    #[test]
    fn snapshot_keeps_insertion_order() {
        let mut col: EntityCollection<u8, String> = EntityCollection::new();
        col.upsert(2, "b".into(), eq);
        col.upsert(1, "a".into(), eq);
        col.upsert(3, "c".into(), eq);
        col.remove(&1);
        let values: Vec<String> = col.snapshot().iter().map(|v| (**v).clone()).collect();
        assert_eq!(values, vec!["b", "c"]);
        assert_eq!(col.keys_where(|_, v| v == "c"), vec![3]);
    }

    #[test]
    fn clear_empties_everything() {
        let mut col: EntityCollection<u8, String> = EntityCollection::new();
        col.upsert(1, "a".into(), eq);
        col.clear();
        assert_eq!(col.len(), 0);
        assert!(col.snapshot().is_empty());
    }
}
