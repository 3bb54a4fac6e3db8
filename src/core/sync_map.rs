//! String-keyed concurrent store with per-entry cache metadata.
//!
//! `SyncMap` is the generic cache primitive behind metadata caches, regex
//! caches, prepared-statement registries and the like. Each entry carries an
//! optional expiry, a last-scan timestamp and a boolean flag alongside its
//! value.
//!
//! The intended serialization mechanism for writes is the single-writer
//! discipline of [`crate::manager::SyncOps`]; the internal lock makes the
//! map safe regardless of the calling thread. Reads take the shared lock
//! directly; a read racing an in-flight queued write may observe pre- or
//! post-write state.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::util::clock::{now_ms, MS_PER_HOUR};

/// Expiry timestamp in ms since epoch; `None` means the entry never expires.
pub type ExpiresAt = Option<u128>;

struct MapEntry<T> {
    value: T,
    /// Cached shared pointer for clone-free reads of large values.
    /// Invalidated by `update_value` since it would otherwise go stale.
    shared: Option<Arc<T>>,
    expires: ExpiresAt,
    last_scan: Option<u128>,
    flag: bool,
}

/// String-keyed concurrent map with expiry/flag/last-scan metadata per key.
pub struct SyncMap<T> {
    entries: RwLock<HashMap<String, MapEntry<T>>>,
}

impl<T> Default for SyncMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncMap<T> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create an empty map with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Insert or wholesale-replace an entry and all of its metadata.
    pub fn insert(
        &self,
        key: impl Into<String>,
        value: T,
        expires: ExpiresAt,
        flag: bool,
        last_scan: Option<u128>,
    ) {
        let mut entries = self.entries.write();
        entries.insert(
            key.into(),
            MapEntry {
                value,
                shared: None,
                expires,
                last_scan,
                flag,
            },
        );
    }

    /// Replace only the value for `key`. Returns false when absent.
    ///
    /// Any cached shared pointer is dropped; re-insert via
    /// [`SyncMap::insert_shared`] to restore it.
    pub fn update_value(&self, key: &str, value: T) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) => {
                entry.value = value;
                entry.shared = None;
                true
            }
            None => false,
        }
    }

    /// Replace only the expiry for `key`.
    ///
    /// Never-expiring entries (`expires == None`) are left untouched: an
    /// entry can only gain an expiry through a full re-insert. Returns
    /// false when absent or never-expiring.
    pub fn update_expires(&self, key: &str, expires: u128) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) if entry.expires.is_some() => {
                entry.expires = Some(expires);
                true
            }
            _ => false,
        }
    }

    /// Replace only the last-scan timestamp for `key`. Returns false when
    /// absent.
    pub fn update_last_scan(&self, key: &str, last_scan: u128) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) => {
                entry.last_scan = Some(last_scan);
                true
            }
            None => false,
        }
    }

    /// Remove the value and all metadata for `key` atomically.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// True if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Cached shared pointer for `key`, when one was stored.
    pub fn get_shared(&self, key: &str) -> Option<Arc<T>> {
        self.entries.read().get(key).and_then(|e| e.shared.clone())
    }

    /// Expiry metadata for `key`; outer `None` means the key is absent.
    pub fn get_expires(&self, key: &str) -> Option<ExpiresAt> {
        self.entries.read().get(key).map(|e| e.expires)
    }

    /// Last-scan timestamp for `key`; outer `None` means the key is absent.
    pub fn get_last_scan(&self, key: &str) -> Option<Option<u128>> {
        self.entries.read().get(key).map(|e| e.last_scan)
    }

    /// Boolean flag for `key`.
    pub fn get_flag(&self, key: &str) -> Option<bool> {
        self.entries.read().get(key).map(|e| e.flag)
    }

    /// Expired-entry check with extend-on-touch cache semantics.
    ///
    /// Returns true when the entry exists and its expiry is in the past;
    /// when `extend` is set the expiry is simultaneously rewritten to
    /// `now + duration_hours`. Absent keys and never-expiring entries
    /// return false.
    pub fn check_expired(&self, key: &str, extend: bool, duration_hours: u64) -> bool {
        let now = now_ms();
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        match entry.expires {
            Some(expires) if expires <= now => {
                if extend {
                    entry.expires = Some(now + u128::from(duration_hours) * MS_PER_HOUR);
                }
                true
            }
            _ => false,
        }
    }

    /// Remove every entry whose value matches `pred`. Returns the number of
    /// removed entries. O(n) scan for cache maintenance.
    pub fn remove_by_value(&self, pred: impl Fn(&T) -> bool) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !pred(&e.value));
        before - entries.len()
    }

    /// Remove every entry whose expiry matches `pred`.
    pub fn remove_by_expiry(&self, pred: impl Fn(ExpiresAt) -> bool) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !pred(e.expires));
        before - entries.len()
    }

    /// Like [`SyncMap::remove_by_expiry`], invoking `on_remove` with each
    /// matched value strictly before its removal. Used to release owned
    /// resources such as prepared statements.
    pub fn remove_by_expiry_with(
        &self,
        pred: impl Fn(ExpiresAt) -> bool,
        mut on_remove: impl FnMut(&T),
    ) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| {
            if pred(e.expires) {
                on_remove(&e.value);
                false
            } else {
                true
            }
        });
        before - entries.len()
    }

    /// Remove every entry whose flag matches `pred`, invoking `on_remove`
    /// with each value strictly before its removal.
    pub fn remove_by_flag_with(
        &self,
        pred: impl Fn(bool) -> bool,
        mut on_remove: impl FnMut(&T),
    ) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| {
            if pred(e.flag) {
                on_remove(&e.value);
                false
            } else {
                true
            }
        });
        before - entries.len()
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

impl<T: Clone> SyncMap<T> {
    /// Insert like [`SyncMap::insert`], additionally caching a shared
    /// pointer so readers can use [`SyncMap::get_shared`] without cloning
    /// the value.
    pub fn insert_shared(
        &self,
        key: impl Into<String>,
        value: T,
        expires: ExpiresAt,
        flag: bool,
        last_scan: Option<u128>,
    ) {
        let shared = Arc::new(value.clone());
        let mut entries = self.entries.write();
        entries.insert(
            key.into(),
            MapEntry {
                value,
                shared: Some(shared),
                expires,
                last_scan,
                flag,
            },
        );
    }

    /// Clone of the value for `key`.
    pub fn get(&self, key: &str) -> Option<T> {
        self.entries.read().get(key).map(|e| e.value.clone())
    }

    /// Snapshot of all keys.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

impl SyncMap<Vec<String>> {
    /// Append `value` to the slice at `key` unless already present.
    ///
    /// Creates the entry (never-expiring, unflagged) when absent. Growth
    /// reserves ten slots of slack so repeated appends do not reallocate
    /// every time. Intended to be invoked only from the writer thread.
    pub fn append_unique(&self, key: &str, value: &str) -> bool {
        let mut entries = self.entries.write();
        let entry = entries.entry(key.to_owned()).or_insert_with(|| MapEntry {
            value: Vec::new(),
            shared: None,
            expires: None,
            last_scan: None,
            flag: false,
        });
        if entry.value.iter().any(|v| v == value) {
            return false;
        }
        if entry.value.len() == entry.value.capacity() {
            entry.value.reserve(10);
        }
        entry.value.push(value.to_owned());
        entry.shared = None;
        true
    }

    /// Remove every occurrence of `value` from the slice at `key`,
    /// preserving the relative order of the remaining elements.
    pub fn remove_value(&self, key: &str, value: &str) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        let before = entry.value.len();
        entry.value.retain(|v| v != value);
        if entry.value.len() != before {
            entry.shared = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_entry_wholesale() {
        let map = SyncMap::new();
        map.insert("a", 1_i32, Some(5), true, Some(7));
        map.insert("a", 2_i32, None, false, None);
        assert_eq!(map.get("a"), Some(2));
        assert_eq!(map.get_expires("a"), Some(None));
        assert_eq!(map.get_flag("a"), Some(false));
        assert_eq!(map.get_last_scan("a"), Some(None));
    }

    #[test]
    fn update_expires_skips_never_expiring() {
        let map = SyncMap::new();
        map.insert("forever", 1_i32, None, false, None);
        map.insert("temp", 2_i32, Some(10), false, None);
        assert!(!map.update_expires("forever", 99));
        assert!(map.update_expires("temp", 99));
        assert_eq!(map.get_expires("forever"), Some(None));
        assert_eq!(map.get_expires("temp"), Some(Some(99)));
    }

    #[test]
    fn check_expired_extends_on_touch() {
        let map = SyncMap::new();
        let past = now_ms() - 1000;
        map.insert("stale", 1_i32, Some(past), false, None);
        assert!(map.check_expired("stale", true, 1));
        let new_expiry = map.get_expires("stale").flatten().unwrap();
        assert!(new_expiry > now_ms());
        // Now fresh: no longer expired, expiry untouched.
        assert!(!map.check_expired("stale", true, 1));
        assert_eq!(map.get_expires("stale"), Some(Some(new_expiry)));
    }

    #[test]
    fn check_expired_absent_and_never_expiring() {
        let map: SyncMap<i32> = SyncMap::new();
        assert!(!map.check_expired("missing", true, 1));
        map.insert("forever", 1, None, false, None);
        assert!(!map.check_expired("forever", true, 1));
        assert_eq!(map.get_expires("forever"), Some(None));
    }

    #[test]
    fn remove_by_expiry_with_calls_back_before_removal() {
        let map = SyncMap::new();
        map.insert("a", 10_i32, Some(1), false, None);
        map.insert("b", 20_i32, Some(2), false, None);
        map.insert("c", 30_i32, None, false, None);
        let mut seen = Vec::new();
        let removed = map.remove_by_expiry_with(
            |exp| matches!(exp, Some(e) if e < 5),
            |v| seen.push(*v),
        );
        assert_eq!(removed, 2);
        seen.sort_unstable();
        assert_eq!(seen, vec![10, 20]);
        assert!(!map.contains("a"));
        assert!(!map.contains("b"));
        assert!(map.contains("c"));
    }

    #[test]
    fn remove_by_flag_with_releases_values() {
        let map = SyncMap::new();
        map.insert("keep", "x".to_owned(), None, false, None);
        map.insert("drop", "y".to_owned(), None, true, None);
        let mut released = Vec::new();
        let removed = map.remove_by_flag_with(|flag| flag, |v| released.push(v.clone()));
        assert_eq!(removed, 1);
        assert_eq!(released, vec!["y".to_owned()]);
        assert!(map.contains("keep"));
    }

    #[test]
    fn shared_pointer_reads_without_clone() {
        let map = SyncMap::new();
        map.insert_shared("big", vec![1_u8; 64], None, false, None);
        let a = map.get_shared("big").unwrap();
        let b = map.get_shared("big").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        // update_value invalidates the cached pointer.
        map.update_value("big", vec![2_u8; 64]);
        assert!(map.get_shared("big").is_none());
        assert_eq!(map.get("big").unwrap()[0], 2);
    }

    #[test]
    fn append_then_remove_restores_order() {
        let map: SyncMap<Vec<String>> = SyncMap::new();
        for v in ["one", "two", "three"] {
            assert!(map.append_unique("list", v));
        }
        // Duplicate append is refused.
        assert!(!map.append_unique("list", "two"));
        assert!(map.append_unique("list", "four"));
        assert!(map.remove_value("list", "four"));
        assert_eq!(
            map.get("list").unwrap(),
            vec!["one".to_owned(), "two".to_owned(), "three".to_owned()]
        );
    }
}
