//! Typed map handles bound to the single-writer mailbox.
//!
//! A handle pairs one concrete map instance with the writer client. The
//! `queue_*` methods are synchronous round-trips through the writer thread
//! (blocking until applied); everything else reads the map directly under
//! its shared lock.

use std::sync::Arc;

use crate::core::sync_map::ExpiresAt;
use crate::core::{SyncError, SyncMap, SyncMapUint};

use super::OpsClient;

/// Handle for a registered [`SyncMap`].
pub struct SyncMapHandle<T> {
    label: Arc<str>,
    map: Arc<SyncMap<T>>,
    client: OpsClient,
}

impl<T> std::fmt::Debug for SyncMapHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncMapHandle")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl<T> Clone for SyncMapHandle<T> {
    fn clone(&self) -> Self {
        Self {
            label: Arc::clone(&self.label),
            map: Arc::clone(&self.map),
            client: self.client.clone(),
        }
    }
}

impl<T> SyncMapHandle<T>
where
    T: Send + Sync + 'static,
{
    pub(super) fn new(label: Arc<str>, map: Arc<SyncMap<T>>, client: OpsClient) -> Self {
        Self { label, map, client }
    }

    /// Label the map was registered under.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Direct access to the underlying map for reads.
    #[must_use]
    pub fn map(&self) -> &Arc<SyncMap<T>> {
        &self.map
    }

    /// Queue a wholesale insert/replace of `key`.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is shut down or the call
    /// originates from the writer thread.
    pub fn queue_insert(
        &self,
        key: String,
        value: T,
        expires: ExpiresAt,
        flag: bool,
        last_scan: Option<u128>,
    ) -> Result<(), SyncError> {
        let map = Arc::clone(&self.map);
        self.client.round_trip(&self.label, "insert", move || {
            map.insert(key, value, expires, flag, last_scan);
        })
    }

    /// Queue a value-only update. Returns whether the key was present.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_update_value(&self, key: String, value: T) -> Result<bool, SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "update_value", move || {
                map.update_value(&key, value)
            })
    }

    /// Queue an expiry-only update; never-expiring entries are untouched.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_update_expires(&self, key: String, expires: u128) -> Result<bool, SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "update_expires", move || {
                map.update_expires(&key, expires)
            })
    }

    /// Queue a last-scan-only update.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_update_last_scan(&self, key: String, last_scan: u128) -> Result<bool, SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "update_last_scan", move || {
                map.update_last_scan(&key, last_scan)
            })
    }

    /// Queue removal of `key` and all its metadata.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_remove(&self, key: String) -> Result<bool, SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "remove", move || map.remove(&key))
    }

    /// Queue the expired-entry check with extend-on-touch semantics; the
    /// boolean result is round-tripped back from the writer.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_check_expired(
        &self,
        key: String,
        extend: bool,
        duration_hours: u64,
    ) -> Result<bool, SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "check_expired", move || {
                map.check_expired(&key, extend, duration_hours)
            })
    }

    /// Queue a sweep deleting entries whose value matches `pred`.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_remove_by_value(
        &self,
        pred: impl Fn(&T) -> bool + Send + 'static,
    ) -> Result<usize, SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "remove_by_value", move || {
                map.remove_by_value(pred)
            })
    }

    /// Queue a sweep deleting entries whose expiry matches `pred`.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_remove_by_expiry(
        &self,
        pred: impl Fn(ExpiresAt) -> bool + Send + 'static,
    ) -> Result<usize, SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "remove_by_expiry", move || {
                map.remove_by_expiry(pred)
            })
    }

    /// Queue an expiry sweep with a release callback invoked for each
    /// value strictly before its removal.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_remove_by_expiry_with(
        &self,
        pred: impl Fn(ExpiresAt) -> bool + Send + 'static,
        on_remove: impl FnMut(&T) + Send + 'static,
    ) -> Result<usize, SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "remove_by_expiry_with", move || {
                map.remove_by_expiry_with(pred, on_remove)
            })
    }

    /// Queue a flag sweep with a release callback invoked for each value
    /// strictly before its removal.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_remove_by_flag_with(
        &self,
        pred: impl Fn(bool) -> bool + Send + 'static,
        on_remove: impl FnMut(&T) + Send + 'static,
    ) -> Result<usize, SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "remove_by_flag_with", move || {
                map.remove_by_flag_with(pred, on_remove)
            })
    }

    /// Direct read: key presence.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains(key)
    }

    /// Direct read: shared pointer when one was cached.
    #[must_use]
    pub fn get_shared(&self, key: &str) -> Option<Arc<T>> {
        self.map.get_shared(key)
    }

    /// Direct read: expiry metadata.
    #[must_use]
    pub fn get_expires(&self, key: &str) -> Option<ExpiresAt> {
        self.map.get_expires(key)
    }

    /// Direct read: last-scan metadata.
    #[must_use]
    pub fn get_last_scan(&self, key: &str) -> Option<Option<u128>> {
        self.map.get_last_scan(key)
    }

    /// Direct read: boolean flag.
    #[must_use]
    pub fn get_flag(&self, key: &str) -> Option<bool> {
        self.map.get_flag(key)
    }
}

impl<T> SyncMapHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Queue an insert that also caches a shared pointer for clone-free
    /// reads.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_insert_shared(
        &self,
        key: String,
        value: T,
        expires: ExpiresAt,
        flag: bool,
        last_scan: Option<u128>,
    ) -> Result<(), SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "insert_shared", move || {
                map.insert_shared(key, value, expires, flag, last_scan);
            })
    }

    /// Direct read: clone of the value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<T> {
        self.map.get(key)
    }
}

impl SyncMapHandle<Vec<String>> {
    /// Queue a dedup-checked append to the string slice at `key`.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_append_unique(&self, key: String, value: String) -> Result<bool, SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "append_unique", move || {
                map.append_unique(&key, &value)
            })
    }

    /// Queue an order-preserving removal of `value` from the string slice
    /// at `key`.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_remove_value(&self, key: String, value: String) -> Result<bool, SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "remove_value", move || {
                map.remove_value(&key, &value)
            })
    }
}

/// Handle for a registered [`SyncMapUint`].
pub struct SyncUintHandle<T> {
    label: Arc<str>,
    map: Arc<SyncMapUint<T>>,
    client: OpsClient,
}

impl<T> Clone for SyncUintHandle<T> {
    fn clone(&self) -> Self {
        Self {
            label: Arc::clone(&self.label),
            map: Arc::clone(&self.map),
            client: self.client.clone(),
        }
    }
}

impl<T> SyncUintHandle<T>
where
    T: Send + Sync + 'static,
{
    pub(super) fn new(label: Arc<str>, map: Arc<SyncMapUint<T>>, client: OpsClient) -> Self {
        Self { label, map, client }
    }

    /// Label the map was registered under.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Direct access to the underlying map for reads.
    #[must_use]
    pub fn map(&self) -> &Arc<SyncMapUint<T>> {
        &self.map
    }

    /// Queue an insert/replace of `key`.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_insert(&self, key: u32, value: T) -> Result<(), SyncError> {
        let map = Arc::clone(&self.map);
        self.client.round_trip(&self.label, "insert", move || {
            map.insert(key, value);
        })
    }

    /// Queue a replace-when-present of `key`.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_update(&self, key: u32, value: T) -> Result<bool, SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "update", move || map.update(key, value))
    }

    /// Queue an in-place mutation of the value at `key`.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_update_with(
        &self,
        key: u32,
        f: impl FnOnce(&mut T) + Send + 'static,
    ) -> Result<bool, SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "update_with", move || map.update_with(key, f))
    }

    /// Queue removal of `key`.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_remove(&self, key: u32) -> Result<bool, SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "remove", move || map.remove(key))
    }

    /// Queue a sweep keeping only entries matching `pred`.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_retain(
        &self,
        pred: impl Fn(u32, &T) -> bool + Send + 'static,
    ) -> Result<usize, SyncError> {
        let map = Arc::clone(&self.map);
        self.client
            .round_trip(&self.label, "retain", move || map.retain(pred))
    }

    /// Queue removal of every entry.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError`] when the manager is unavailable.
    pub fn queue_clear(&self) -> Result<(), SyncError> {
        let map = Arc::clone(&self.map);
        self.client.round_trip(&self.label, "clear", move || {
            map.clear();
        })
    }

    /// Direct read: key presence.
    #[must_use]
    pub fn contains(&self, key: u32) -> bool {
        self.map.contains(key)
    }

    /// Direct read: number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Direct read: true when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<T> SyncUintHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Direct read: clone of the value at `key`.
    #[must_use]
    pub fn get(&self, key: u32) -> Option<T> {
        self.map.get(key)
    }

    /// Direct read: owned copy of the whole map.
    #[must_use]
    pub fn snapshot(&self) -> std::collections::HashMap<u32, T> {
        self.map.snapshot()
    }
}
