//! Integration tests for the single-writer synchronization manager.

use std::sync::Arc;
use std::thread;

use fetcharr_core::core::{SyncError, SyncMap, SyncMapUint};
use fetcharr_core::manager::SyncOps;
use fetcharr_core::util::clock::now_ms;

#[test]
fn concurrent_queued_updates_are_all_applied() {
    let ops = SyncOps::start();
    let counters = ops
        .register_uint_map("counters", SyncMapUint::<u64>::new())
        .unwrap();
    counters.queue_insert(1, 0).unwrap();

    // Read-modify-write through the writer thread from many threads at
    // once. With per-thread locking this pattern would lose increments;
    // the single writer applies every closure exactly once.
    let threads: u64 = 8;
    let per_thread: u64 = 50;
    let mut handles = Vec::new();
    for _ in 0..threads {
        let counters = counters.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..per_thread {
                counters.queue_update_with(1, |v| *v += 1).unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(counters.get(1), Some(threads * per_thread));
    ops.shutdown();
}

#[test]
fn duplicate_labels_are_refused() {
    let ops = SyncOps::start();
    ops.register_map("titles", SyncMap::<String>::new()).unwrap();
    let err = ops
        .register_map("titles", SyncMap::<String>::new())
        .unwrap_err();
    assert!(matches!(err, SyncError::DuplicateMap(label) if label == "titles"));
    ops.shutdown();
}

#[test]
fn operations_after_shutdown_fail_closed() {
    let ops = SyncOps::start();
    let map = ops
        .register_map("cache", SyncMap::<String>::new())
        .unwrap();
    map.queue_insert("k".into(), "v".into(), None, false, None)
        .unwrap();
    ops.shutdown();
    assert!(ops.is_shut_down());

    let err = map.queue_insert("k2".into(), "v2".into(), None, false, None);
    assert!(matches!(err, Err(SyncError::Closed)));
    let err = ops.register_map("late", SyncMap::<String>::new());
    assert!(matches!(err, Err(SyncError::Closed)));
    // Direct reads keep working; only mutation goes through the writer.
    assert!(map.contains("k"));
}

#[test]
fn shutdown_is_idempotent() {
    let ops = SyncOps::start();
    ops.shutdown();
    ops.shutdown();
    assert!(ops.is_shut_down());
}

#[test]
fn expiry_check_extends_on_touch() {
    let ops = SyncOps::start();
    let cache = ops
        .register_map("grab_cache", SyncMap::<String>::new())
        .unwrap();

    let stale = now_ms().saturating_sub(1000);
    cache
        .queue_insert("release-a".into(), "payload".into(), Some(stale), false, None)
        .unwrap();

    // Expired entry reports true and, with extend set, gets a fresh TTL.
    assert!(cache.queue_check_expired("release-a".into(), true, 2).unwrap());
    let extended = cache.get_expires("release-a").unwrap().unwrap();
    assert!(extended > now_ms());
    // Freshly extended entry is no longer expired.
    assert!(!cache.queue_check_expired("release-a".into(), true, 2).unwrap());

    // Absent keys and never-expiring entries both report false.
    assert!(!cache.queue_check_expired("missing".into(), true, 2).unwrap());
    cache
        .queue_insert("pinned".into(), "payload".into(), None, false, None)
        .unwrap();
    assert!(!cache.queue_check_expired("pinned".into(), false, 2).unwrap());

    ops.shutdown();
}

#[test]
fn expiry_sweep_invokes_release_callback_before_removal() {
    let ops = SyncOps::start();
    let cache = ops
        .register_map("handles", SyncMap::<String>::new())
        .unwrap();

    let stale = now_ms().saturating_sub(5000);
    cache
        .queue_insert("old".into(), "old-handle".into(), Some(stale), false, None)
        .unwrap();
    cache
        .queue_insert("live".into(), "live-handle".into(), Some(now_ms() + 60_000), false, None)
        .unwrap();

    let released = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&released);
    let now = now_ms();
    let removed = cache
        .queue_remove_by_expiry_with(
            move |expires| matches!(expires, Some(e) if e <= now),
            move |v: &String| sink.lock().push(v.clone()),
        )
        .unwrap();

    assert_eq!(removed, 1);
    assert_eq!(released.lock().as_slice(), ["old-handle".to_owned()]);
    assert!(!cache.contains("old"));
    assert!(cache.contains("live"));
    ops.shutdown();
}

#[test]
fn string_slice_map_appends_and_removes_in_order() {
    let ops = SyncOps::start();
    let lists = ops
        .register_map("title_slugs", SyncMap::<Vec<String>>::new())
        .unwrap();

    lists.queue_append_unique("movie-1".into(), "slug-a".into()).unwrap();
    lists.queue_append_unique("movie-1".into(), "slug-b".into()).unwrap();
    lists.queue_append_unique("movie-1".into(), "slug-c".into()).unwrap();
    // Duplicate append is refused.
    assert!(!lists.queue_append_unique("movie-1".into(), "slug-b".into()).unwrap());

    assert!(lists.queue_remove_value("movie-1".into(), "slug-b".into()).unwrap());
    assert_eq!(
        lists.get("movie-1").unwrap(),
        vec!["slug-a".to_owned(), "slug-c".to_owned()]
    );
    ops.shutdown();
}
