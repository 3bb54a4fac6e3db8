//! Sliding-window admission control for rate-limited external services.
//!
//! One limiter instance guards one external service or call category. The
//! limiter tracks a rolling count of granted calls inside a trailing
//! interval and can be fast-forwarded when a remote backoff signal (e.g. a
//! `Retry-After` header or a daily-quota stop) says nothing should be
//! admitted before a given instant.
//!
//! Exhaustion is communicated as a wait duration, not an error; callers with
//! a bounded retry budget convert repeated denial into a terminal
//! rate-limited failure at their own layer.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed now.
    Granted,
    /// The call must wait at least `retry_after` before it can be granted.
    Denied {
        /// Earliest duration after which a re-check can succeed.
        retry_after: Duration,
    },
}

impl Admission {
    /// True if the call was granted.
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }

    /// The wait duration for a denied call, zero when granted.
    #[must_use]
    pub const fn retry_after(&self) -> Duration {
        match self {
            Self::Granted => Duration::ZERO,
            Self::Denied { retry_after } => *retry_after,
        }
    }
}

/// Mutable window state, guarded by the limiter's mutex.
#[derive(Debug, Clone, Copy)]
struct Window {
    /// Start of the current counting window.
    start: Instant,
    /// Time of the most recent granted call. May sit in the future after
    /// [`SlidingWindowLimiter::wait_till`].
    last_call: Instant,
    /// Calls granted inside the current window.
    count: u32,
}

/// Sliding-window rate limiter.
///
/// Thread-safe: all state lives behind an internal `parking_lot::Mutex`, so
/// one instance may be shared across threads without the caller providing
/// its own locking discipline.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max: u32,
    interval: Duration,
    window: Mutex<Window>,
}

impl SlidingWindowLimiter {
    /// Create a limiter granting at most `max` calls per `interval`.
    #[must_use]
    pub fn new(max: u32, interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            max,
            interval,
            window: Mutex::new(Window {
                start: now,
                last_call: now,
                count: 0,
            }),
        }
    }

    /// Check whether a call would be admitted, without committing it.
    pub fn check(&self) -> Admission {
        let window = self.window.lock();
        Self::check_inner(&window, self.max, self.interval, Instant::now())
    }

    /// Check and, only if admitted, commit the call.
    pub fn allow(&self) -> Admission {
        let mut window = self.window.lock();
        let now = Instant::now();
        let decision = Self::check_inner(&window, self.max, self.interval, now);
        if decision.is_granted() {
            Self::commit(&mut window, self.interval, now);
        }
        decision
    }

    /// Commit a call regardless of the window state.
    ///
    /// Used when an external decision (a caller's own bounded retry loop,
    /// or a response that already consumed quota) has determined the call
    /// proceeds either way.
    pub fn allow_force(&self) {
        let mut window = self.window.lock();
        Self::commit(&mut window, self.interval, Instant::now());
    }

    /// Force the limiter closed until `t` passes.
    ///
    /// Every check fails with the remaining wait until then. This is the
    /// mechanism for honoring a remote `Retry-After` or a hard daily-quota
    /// stop: park the limiter at the quota reset instant.
    pub fn wait_till(&self, t: Instant) {
        let mut window = self.window.lock();
        window.last_call = t;
    }

    /// Maximum calls per window.
    #[must_use]
    pub const fn max_calls(&self) -> u32 {
        self.max
    }

    /// Window interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    fn check_inner(window: &Window, max: u32, interval: Duration, now: Instant) -> Admission {
        // A future last_call means the limiter was parked via wait_till.
        if now < window.last_call {
            return Admission::Denied {
                retry_after: window.last_call.duration_since(now),
            };
        }
        // Either rollover condition means the window is stale even though
        // commit() has not observed it yet.
        if window.count < max
            || now.duration_since(window.last_call) > interval
            || now.duration_since(window.start) > interval
        {
            return Admission::Granted;
        }
        // Window is full; earliest grant is when the older of the two
        // timestamps ages out of the interval.
        let reopens = window.start.min(window.last_call) + interval;
        Admission::Denied {
            retry_after: reopens.saturating_duration_since(now).max(Duration::from_millis(1)),
        }
    }

    fn commit(window: &mut Window, interval: Duration, now: Instant) {
        if now.saturating_duration_since(window.last_call) > interval
            || now.saturating_duration_since(window.start) > interval
        {
            window.start = now;
            window.count = 1;
        } else {
            window.count = window.count.saturating_add(1);
        }
        window.last_call = now;
    }
}

/// A per-interval limiter paired with an optional daily-quota limiter.
///
/// Admission requires both to allow. The daily limiter's window is sized to
/// a full day, so it effectively never auto-resets mid-day; a detected
/// remote quota stop is applied with [`PairedLimiter::wait_till_daily`].
#[derive(Debug)]
pub struct PairedLimiter {
    primary: SlidingWindowLimiter,
    daily: Option<SlidingWindowLimiter>,
}

impl PairedLimiter {
    /// Pair a primary limiter with an optional daily limiter.
    #[must_use]
    pub const fn new(primary: SlidingWindowLimiter, daily: Option<SlidingWindowLimiter>) -> Self {
        Self { primary, daily }
    }

    /// Check both limiters without committing.
    pub fn check(&self) -> Admission {
        if let Some(daily) = &self.daily {
            let decision = daily.check();
            if !decision.is_granted() {
                return decision;
            }
        }
        self.primary.check()
    }

    /// Admit through both limiters, committing both on grant.
    pub fn allow(&self) -> Admission {
        if let Some(daily) = &self.daily {
            let decision = daily.check();
            if !decision.is_granted() {
                return decision;
            }
        }
        let decision = self.primary.allow();
        if decision.is_granted() {
            if let Some(daily) = &self.daily {
                daily.allow_force();
            }
        }
        decision
    }

    /// Park the primary limiter until `t` (e.g. `Retry-After`).
    pub fn wait_till(&self, t: Instant) {
        self.primary.wait_till(t);
    }

    /// Park the daily limiter until `t` (e.g. quota resets at midnight).
    /// No-op when no daily limiter is attached.
    pub fn wait_till_daily(&self, t: Instant) {
        if let Some(daily) = &self.daily {
            daily.wait_till(t);
        }
    }
}
