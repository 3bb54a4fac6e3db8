//! Minimal cron-evaluation abstraction.
//!
//! The dispatcher only ever asks "given `now`, when does this spec fire
//! next?", so the concrete parser/engine (currently the `cron` crate) stays
//! swappable behind [`CronPlan`] without touching scheduler logic.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use cron::Schedule;

/// A parsed cron expression that can compute its next firing instant.
#[derive(Clone)]
pub struct CronPlan {
    spec: String,
    schedule: Schedule,
}

impl CronPlan {
    /// Parse a cron expression, failing fast on syntax errors.
    ///
    /// Classic five-field expressions (`min hour dom month dow`) are
    /// accepted by normalizing to the engine's six-field form with a zero
    /// seconds column.
    ///
    /// # Errors
    ///
    /// Returns the engine's parse error for malformed expressions.
    pub fn parse(spec: &str) -> Result<Self, cron::error::Error> {
        let normalized = if spec.split_whitespace().count() == 5 {
            format!("0 {spec}")
        } else {
            spec.to_owned()
        };
        let schedule = Schedule::from_str(&normalized)?;
        Ok(Self {
            spec: spec.to_owned(),
            schedule,
        })
    }

    /// The original expression as registered.
    #[must_use]
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Next firing instant strictly after `now`.
    #[must_use]
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }

    /// Next firing instant strictly after `now_ms` (ms since epoch), in the
    /// same representation. `None` when the expression never fires again or
    /// `now_ms` is out of range.
    #[must_use]
    pub fn next_after_ms(&self, now_ms: u128) -> Option<u128> {
        let now = Utc.timestamp_millis_opt(i64::try_from(now_ms).ok()?).single()?;
        let next = self.next_after(now)?;
        u128::try_from(next.timestamp_millis()).ok()
    }
}

impl fmt::Debug for CronPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronPlan").field("spec", &self.spec).finish()
    }
}
