//! Uint32-keyed concurrent store without cache metadata.
//!
//! Used where entries have explicit, short, deterministic lifetimes rather
//! than TTL semantics: one job's time in the queue registry, one schedule's
//! registration. Same locking discipline as [`crate::core::SyncMap`]: the
//! read lock serves any thread, mutation is serialized by the single-writer
//! manager.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Uint32-keyed concurrent map, bare values only.
pub struct SyncMapUint<T> {
    entries: RwLock<HashMap<u32, T>>,
}

impl<T> Default for SyncMapUint<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncMapUint<T> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace the value for `key`.
    pub fn insert(&self, key: u32, value: T) {
        self.entries.write().insert(key, value);
    }

    /// Replace the value for `key` only when present. Returns false when
    /// absent.
    pub fn update(&self, key: u32, value: T) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(&key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Mutate the value for `key` in place. Returns false when absent.
    pub fn update_with(&self, key: u32, f: impl FnOnce(&mut T)) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(&key) {
            Some(slot) => {
                f(slot);
                true
            }
            None => false,
        }
    }

    /// Remove the value for `key`. Returns false when absent.
    pub fn remove(&self, key: u32) -> bool {
        self.entries.write().remove(&key).is_some()
    }

    /// True if `key` is present.
    pub fn contains(&self, key: u32) -> bool {
        self.entries.read().contains_key(&key)
    }

    /// Visit every entry under the read lock.
    pub fn for_each(&self, mut f: impl FnMut(u32, &T)) {
        for (k, v) in self.entries.read().iter() {
            f(*k, v);
        }
    }

    /// Keep only the entries matching `pred`. Returns the number removed.
    pub fn retain(&self, pred: impl Fn(u32, &T) -> bool) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, v| pred(*k, v));
        before - entries.len()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Key of the first entry matching `pred`, in arbitrary iteration
    /// order.
    pub fn find_first(&self, pred: impl Fn(&T) -> bool) -> Option<u32> {
        self.entries
            .read()
            .iter()
            .find(|(_, v)| pred(v))
            .map(|(k, _)| *k)
    }

    /// True when any entry matches `pred`.
    pub fn any(&self, pred: impl Fn(&T) -> bool) -> bool {
        self.entries.read().values().any(|v| pred(v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T: Clone> SyncMapUint<T> {
    /// Clone of the value for `key`.
    pub fn get(&self, key: u32) -> Option<T> {
        self.entries.read().get(&key).cloned()
    }

    /// Owned copy of the whole map; later mutations do not affect it.
    pub fn snapshot(&self) -> HashMap<u32, T> {
        self.entries.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_update_remove_roundtrip() {
        let map = SyncMapUint::new();
        map.insert(1, "a".to_owned());
        assert!(map.contains(1));
        assert!(map.update(1, "b".to_owned()));
        assert!(!map.update(2, "c".to_owned()));
        assert_eq!(map.get(1), Some("b".to_owned()));
        assert!(map.remove(1));
        assert!(!map.remove(1));
        assert!(map.is_empty());
    }

    #[test]
    fn update_with_mutates_in_place() {
        let map = SyncMapUint::new();
        map.insert(7, 10_i64);
        assert!(map.update_with(7, |v| *v += 5));
        assert_eq!(map.get(7), Some(15));
        assert!(!map.update_with(8, |v| *v += 1));
    }

    #[test]
    fn retain_and_find_first() {
        let map = SyncMapUint::new();
        for i in 0..10_u32 {
            map.insert(i, i * 2);
        }
        assert_eq!(map.retain(|k, _| k % 2 == 0), 5);
        assert_eq!(map.len(), 5);
        assert!(map.any(|v| *v == 8));
        let key = map.find_first(|v| *v == 8).unwrap();
        assert_eq!(key, 4);
        assert!(map.find_first(|v| *v == 9).is_none());
    }

    #[test]
    fn snapshot_is_detached() {
        let map = SyncMapUint::new();
        map.insert(1, "x".to_owned());
        let snap = map.snapshot();
        map.insert(2, "y".to_owned());
        assert_eq!(snap.len(), 1);
        assert_eq!(map.len(), 2);
    }
}
