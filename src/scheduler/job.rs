//! Job and schedule records, queue categories, alias-group
//! de-duplication, and the pooled job object.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::cron::CronPlan;
use super::pool::PoolKind;

/// Named job class routed to a dedicated bounded worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueCategory {
    /// File-data scans (library imports, disk refreshes).
    Data,
    /// Feed imports (RSS, lists, calendars).
    Feeds,
    /// Searches against external indexers.
    Search,
    /// Direct indexer maintenance work.
    Indexer,
    /// Release-name parsing work.
    Parse,
}

impl QueueCategory {
    /// The worker pool this category executes on.
    #[must_use]
    pub const fn pool(self) -> PoolKind {
        match self {
            Self::Data => PoolKind::Files,
            Self::Feeds => PoolKind::Metadata,
            Self::Search => PoolKind::Search,
            Self::Indexer => PoolKind::Indexer,
            Self::Parse => PoolKind::Parse,
        }
    }

    /// Submission-throttle bucket. Data, Feeds and Search each own a
    /// bucket; everything else shares the default bucket.
    pub(crate) const fn throttle_bucket(self) -> usize {
        match self {
            Self::Data => 0,
            Self::Feeds => 1,
            Self::Search => 2,
            Self::Indexer | Self::Parse => 3,
        }
    }

    /// Number of throttle buckets.
    pub(crate) const BUCKETS: usize = 4;

    /// Stable lowercase name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Feeds => "feeds",
            Self::Search => "search",
            Self::Indexer => "indexer",
            Self::Parse => "parse",
        }
    }
}

impl fmt::Display for QueueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a schedule decides its next firing instant.
#[derive(Clone)]
pub enum ScheduleKind {
    /// Calendar-based trigger carrying its parsed plan.
    Cron(Arc<CronPlan>),
    /// Fixed-interval trigger.
    Interval(Duration),
}

impl ScheduleKind {
    /// Next firing instant strictly after `now_ms`.
    #[must_use]
    pub fn next_after_ms(&self, now_ms: u128) -> u128 {
        match self {
            // A cron line with no future firing parks itself a day out and
            // re-evaluates then.
            Self::Cron(plan) => plan
                .next_after_ms(now_ms)
                .unwrap_or(now_ms + 24 * 60 * 60 * 1000),
            Self::Interval(every) => now_ms + every.as_millis(),
        }
    }
}

impl fmt::Debug for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron(plan) => write!(f, "Cron({})", plan.spec()),
            Self::Interval(every) => write!(f, "Interval({every:?})"),
        }
    }
}

/// A registered recurring trigger and its live bookkeeping.
#[derive(Debug, Clone)]
pub struct JobSchedule {
    /// Registry key.
    pub id: u32,
    /// Job display name (also the de-duplication key).
    pub name: String,
    /// Category the fired jobs are submitted under.
    pub category: QueueCategory,
    /// Cron or interval trigger.
    pub kind: ScheduleKind,
    /// Wall clock of the last submission, ms since epoch; 0 = never ran.
    pub last_run: u128,
    /// Wall clock of the next planned firing, ms since epoch.
    pub next_run: u128,
    /// True while a job fired from this schedule is still executing.
    pub is_running: bool,
}

/// A job's entry in the queue registry, present only between submission
/// and completion.
#[derive(Debug, Clone)]
pub struct JobEntry {
    /// Registry key.
    pub id: u32,
    /// Job display name.
    pub name: String,
    /// Category the job was submitted under.
    pub category: QueueCategory,
    /// Originating schedule, when fired from one. Weak back-reference:
    /// lookup by id only, no ownership.
    pub schedule_id: Option<u32>,
    /// Submission wall clock, ms since epoch.
    pub added: u128,
    /// Start wall clock, ms since epoch; 0 = not started. De-duplication
    /// only considers started entries.
    pub started: u128,
    /// Cooperative cancellation flag; checked by the pool before the job
    /// closure runs.
    pub cancelled: Arc<AtomicBool>,
}

impl JobEntry {
    /// True once the cancellation flag is set.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Pooled execution record. Reset on acquire so no closure, name or
/// cancellation token leaks between reuses.
pub(crate) struct Job {
    pub id: u32,
    pub name: String,
    pub category: QueueCategory,
    pub schedule_id: Option<u32>,
    pub added: u128,
    pub started: u128,
    pub cancelled: Arc<AtomicBool>,
    pub run: Option<Box<dyn FnOnce() + Send>>,
}

impl Job {
    fn blank() -> Self {
        Self {
            id: 0,
            name: String::new(),
            category: QueueCategory::Data,
            schedule_id: None,
            added: 0,
            started: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
            run: None,
        }
    }

    /// Reset every field for reuse. The cancellation token is replaced,
    /// not cleared: an old holder of the previous token must not be able
    /// to cancel the next job.
    fn reset(&mut self) {
        self.id = 0;
        self.name.clear();
        self.category = QueueCategory::Data;
        self.schedule_id = None;
        self.added = 0;
        self.started = 0;
        self.cancelled = Arc::new(AtomicBool::new(false));
        self.run = None;
    }
}

/// Free list of [`Job`] objects.
pub(crate) struct JobPool {
    free: Mutex<Vec<Job>>,
    max_idle: usize,
}

impl JobPool {
    pub(crate) fn new(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Take a job object, reset and ready to populate.
    pub(crate) fn acquire(&self) -> Job {
        let mut free = self.free.lock();
        match free.pop() {
            Some(mut job) => {
                job.reset();
                job
            }
            None => Job::blank(),
        }
    }

    /// Return a job object for reuse. The closure is dropped here if the
    /// job never ran.
    pub(crate) fn release(&self, mut job: Job) {
        job.run = None;
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(job);
        }
    }

    #[cfg(test)]
    pub(crate) fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

const SEARCH_MISSING_GROUP: [&str; 4] = [
    "searchmissinginc",
    "searchmissinginctitle",
    "searchmissingfull",
    "searchmissingfulltitle",
];

const SEARCH_UPGRADE_GROUP: [&str; 4] = [
    "searchupgradeinc",
    "searchupgradeinctitle",
    "searchupgradefull",
    "searchupgradefulltitle",
];

/// Expand a `{prefix}_{suffix}` job name into its mutually-exclusive alias
/// group: the same suffix under every sibling prefix. The group members
/// are overlapping scan strategies over one target set; running two
/// concurrently wastes I/O and risks duplicate downloads. Names outside
/// any recognized group return `None` and are never de-duplicated.
pub(crate) fn alias_names(name: &str) -> Option<Vec<String>> {
    let (prefix, suffix) = name.split_once('_')?;
    let group: &[&str] = if SEARCH_MISSING_GROUP.contains(&prefix) {
        &SEARCH_MISSING_GROUP
    } else if SEARCH_UPGRADE_GROUP.contains(&prefix) {
        &SEARCH_UPGRADE_GROUP
    } else {
        return None;
    };
    Some(group.iter().map(|p| format!("{p}_{suffix}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_group_expands_same_suffix() {
        let aliases = alias_names("searchmissinginc_movies").unwrap();
        assert_eq!(aliases.len(), 4);
        assert!(aliases.contains(&"searchmissingfulltitle_movies".to_owned()));
        assert!(aliases.iter().all(|a| a.ends_with("_movies")));
    }

    #[test]
    fn upgrade_group_is_separate() {
        let aliases = alias_names("searchupgradefull_series").unwrap();
        assert!(aliases.contains(&"searchupgradeinc_series".to_owned()));
        assert!(!aliases.contains(&"searchmissinginc_series".to_owned()));
    }

    #[test]
    fn unrecognized_names_are_not_grouped() {
        assert!(alias_names("refreshmeta_movies").is_none());
        assert!(alias_names("nodelimiter").is_none());
    }

    #[test]
    fn job_pool_resets_on_acquire() {
        let pool = JobPool::new(4);
        let mut job = pool.acquire();
        job.id = 9;
        job.name.push_str("searchmissinginc_movies");
        job.started = 123;
        job.run = Some(Box::new(|| {}));
        let old_token = Arc::clone(&job.cancelled);
        old_token.store(true, Ordering::Release);
        pool.release(job);
        assert_eq!(pool.idle(), 1);

        let reused = pool.acquire();
        assert_eq!(reused.id, 0);
        assert!(reused.name.is_empty());
        assert_eq!(reused.started, 0);
        assert!(reused.run.is_none());
        // Fresh token: the old holder cannot cancel the new job.
        assert!(!reused.cancelled.load(Ordering::Acquire));
        assert!(!Arc::ptr_eq(&old_token, &reused.cancelled));
    }

    #[test]
    fn job_pool_bounds_idle_objects() {
        let pool = JobPool::new(2);
        for _ in 0..5 {
            let job = pool.acquire();
            pool.release(job);
        }
        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();
        pool.release(a);
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn category_routing_and_buckets() {
        assert_eq!(QueueCategory::Data.pool(), PoolKind::Files);
        assert_eq!(QueueCategory::Feeds.pool(), PoolKind::Metadata);
        assert_eq!(QueueCategory::Search.pool(), PoolKind::Search);
        assert_eq!(
            QueueCategory::Indexer.throttle_bucket(),
            QueueCategory::Parse.throttle_bucket()
        );
        assert_ne!(
            QueueCategory::Data.throttle_bucket(),
            QueueCategory::Search.throttle_bucket()
        );
    }
}
