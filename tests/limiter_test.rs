//! Integration tests for the sliding-window limiter under shared use.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fetcharr_core::core::{PairedLimiter, SlidingWindowLimiter};

#[test]
fn shared_limiter_grants_exactly_max_under_contention() {
    let limiter = Arc::new(SlidingWindowLimiter::new(10, Duration::from_secs(60)));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let limiter = Arc::clone(&limiter);
        handles.push(thread::spawn(move || {
            let mut granted = 0_u32;
            for _ in 0..10 {
                if limiter.allow().is_granted() {
                    granted += 1;
                }
            }
            granted
        }));
    }
    let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    // 80 attempts against a budget of 10 inside one window.
    assert_eq!(total, 10);
}

#[test]
fn remote_backoff_parks_all_callers() {
    let limiter = Arc::new(SlidingWindowLimiter::new(100, Duration::from_millis(10)));
    limiter.wait_till(Instant::now() + Duration::from_millis(80));

    let shared = Arc::clone(&limiter);
    let denied_elsewhere = thread::spawn(move || !shared.allow().is_granted())
        .join()
        .unwrap();
    assert!(denied_elsewhere);

    thread::sleep(Duration::from_millis(100));
    assert!(limiter.allow().is_granted());
}

#[test]
fn denied_retry_after_is_honest() {
    let limiter = SlidingWindowLimiter::new(2, Duration::from_millis(100));
    assert!(limiter.allow().is_granted());
    assert!(limiter.allow().is_granted());

    let denied = limiter.allow();
    assert!(!denied.is_granted());
    let wait = denied.retry_after();
    assert!(wait > Duration::ZERO && wait <= Duration::from_millis(100));

    // Waiting the advertised duration reopens the window.
    thread::sleep(wait + Duration::from_millis(10));
    assert!(limiter.allow().is_granted());
}

#[test]
fn paired_daily_quota_outlives_window_resets() {
    let pair = PairedLimiter::new(
        SlidingWindowLimiter::new(2, Duration::from_millis(30)),
        Some(SlidingWindowLimiter::new(3, Duration::from_secs(24 * 60 * 60))),
    );
    assert!(pair.allow().is_granted());
    assert!(pair.allow().is_granted());
    // Primary window exhausted; wait for it to reopen.
    thread::sleep(Duration::from_millis(40));
    assert!(pair.allow().is_granted());
    // Daily budget of 3 now spent, regardless of the reopened primary.
    thread::sleep(Duration::from_millis(40));
    assert!(!pair.allow().is_granted());
}
