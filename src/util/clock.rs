//! Millisecond wall-clock helpers.
//!
//! Map expiry and job bookkeeping use milliseconds since the Unix epoch as
//! the canonical timestamp representation. Monotonic `Instant`s are used
//! where only elapsed time matters (throttle gaps, limiter windows).

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Milliseconds in one hour, for expiry arithmetic.
pub const MS_PER_HOUR: u128 = 60 * 60 * 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
        // Sanity: we are well past 2020.
        assert!(a > 1_577_836_800_000);
    }
}
