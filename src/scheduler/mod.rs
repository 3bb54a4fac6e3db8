//! Cron/interval job scheduling and admission-controlled dispatch.
//!
//! Two admission-controlled registration paths (cron and interval) feed one
//! execution path, alongside one-shot immediate dispatch. Admission runs
//! de-duplication over alias-grouped job names, then a per-category
//! submission throttle; accepted jobs are registered in the queue registry
//! through the single-writer manager and executed on the matching bounded
//! worker pool.
//!
//! The throttle exists to bound bursty fan-out when many schedules fire in
//! the same tick; the de-duplication exists because alias-grouped job names
//! are overlapping scan strategies over the same target set.

/// Minimal cron-evaluation abstraction.
pub mod cron;
/// Job and schedule records, categories, de-duplication.
pub mod job;
/// Bounded worker pools.
pub mod pool;

pub use cron::CronPlan;
pub use job::{JobEntry, JobSchedule, QueueCategory, ScheduleKind};
pub use pool::{JobOutcome, PoolKind, PoolStats, WorkerPools};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::config::DispatcherSettings;
use crate::core::DispatchError;
use crate::manager::SyncUintHandle;
use crate::util::clock::now_ms;

use job::{alias_names, JobPool};
use pool::PoolJob;

/// Ceiling on the tick thread's sleep so newly due schedules are noticed
/// promptly even without an explicit wake.
const TICK_WAIT: Duration = Duration::from_millis(500);

/// Per-bucket submission timestamps guarded by the admission mutex. The
/// mutex covers the admission decision and the queue-registry insert,
/// never the job's execution.
struct AdmissionState {
    last_submit: [Option<Instant>; QueueCategory::BUCKETS],
}

struct Inner {
    submit_gap: Duration,
    submit_retries: u32,
    pools: Arc<WorkerPools>,
    queue: SyncUintHandle<JobEntry>,
    schedules: SyncUintHandle<JobSchedule>,
    /// Schedule id -> reusable job closure. Kept apart from the schedule
    /// registry so registry snapshots stay plain data.
    tasks: Mutex<HashMap<u32, Arc<dyn Fn() + Send + Sync>>>,
    admission: Mutex<AdmissionState>,
    job_pool: JobPool,
    job_seq: AtomicU32,
    schedule_seq: AtomicU32,
    shutdown: AtomicBool,
    tick_flag: Mutex<bool>,
    tick_cv: Condvar,
}

impl Inner {
    fn wake(&self) {
        *self.tick_flag.lock() = true;
        self.tick_cv.notify_one();
    }

    /// Run the admission path and, on acceptance, submit to the matching
    /// pool. May sleep up to `submit_retries * submit_gap` in the throttle
    /// loop.
    fn admit_and_submit(
        inner: &Arc<Self>,
        name: &str,
        category: QueueCategory,
        schedule_id: Option<u32>,
        run: Box<dyn FnOnce() + Send>,
    ) -> Result<u32, DispatchError> {
        if inner.shutdown.load(Ordering::Acquire) {
            return Err(DispatchError::Shutdown);
        }
        let bucket = category.throttle_bucket();
        let aliases = alias_names(name);
        let mut attempt = 0_u32;
        let admission = loop {
            let mut admission = inner.admission.lock();
            // De-duplication re-checked on every attempt: a sibling may
            // have started while we slept.
            if let Some(aliases) = &aliases {
                let clash = inner
                    .queue
                    .map()
                    .any(|e| e.started != 0 && aliases.iter().any(|a| a == &e.name));
                if clash {
                    drop(admission);
                    info!(job = name, "already queued");
                    return Err(DispatchError::AlreadyQueued(name.to_owned()));
                }
            }
            let now = Instant::now();
            let open = admission.last_submit[bucket]
                .map_or(true, |last| now.duration_since(last) >= inner.submit_gap);
            if open {
                admission.last_submit[bucket] = Some(now);
                break admission;
            }
            drop(admission);
            attempt += 1;
            if attempt > inner.submit_retries {
                warn!(job = name, category = %category, "submission skipped: throttle exhausted");
                return Err(DispatchError::Throttled(name.to_owned()));
            }
            thread::sleep(inner.submit_gap);
        };

        let now = now_ms();
        let mut job = inner.job_pool.acquire();
        job.id = inner.job_seq.fetch_add(1, Ordering::Relaxed);
        job.name.push_str(name);
        job.category = category;
        job.schedule_id = schedule_id;
        job.added = now;
        job.started = now;
        job.run = Some(run);

        let entry = JobEntry {
            id: job.id,
            name: job.name.clone(),
            category,
            schedule_id,
            added: now,
            started: now,
            cancelled: Arc::clone(&job.cancelled),
        };
        inner.queue.queue_insert(job.id, entry)?;
        // The registry entry must be visible before the admission lock is
        // released: a sibling checking the registry alone could otherwise
        // pass de-duplication while this insert is still in the writer's
        // mailbox. The writer never takes the admission lock.
        drop(admission);
        if let Some(sid) = schedule_id {
            inner.schedules.queue_update_with(sid, move |s| {
                s.is_running = true;
                s.last_run = now;
                s.next_run = s.kind.next_after_ms(now);
            })?;
        }

        let job_id = job.id;
        let run = job.run.take().unwrap_or_else(|| Box::new(|| {}));
        let pool_job = PoolJob {
            name: job.name.clone(),
            cancelled: Arc::clone(&job.cancelled),
            run,
            done: {
                let inner = Arc::clone(inner);
                Box::new(move |outcome| inner.finish_job(job, outcome))
            },
        };
        debug!(job = name, id = job_id, category = %category, "job submitted");
        if let Err(e) = inner.pools.submit(category.pool(), pool_job) {
            warn!(job = name, error = %e, "pool refused job, rolling back");
            let _ = inner.queue.queue_remove(job_id);
            if let Some(sid) = schedule_id {
                let _ = inner.schedules.queue_update_with(sid, |s| s.is_running = false);
            }
            return Err(DispatchError::Shutdown);
        }
        Ok(job_id)
    }

    /// Completion bookkeeping, run by the pool worker on every outcome:
    /// flip the schedule's running flag, drop the queue entry, recycle the
    /// job object.
    fn finish_job(&self, job: job::Job, outcome: JobOutcome) {
        if let Some(sid) = job.schedule_id {
            if let Err(e) = self.schedules.queue_update_with(sid, |s| s.is_running = false) {
                debug!(schedule = sid, error = %e, "schedule flag reset skipped");
            }
        }
        if let Err(e) = self.queue.queue_remove(job.id) {
            debug!(job = %job.name, error = %e, "queue entry removal skipped");
        }
        let elapsed_ms = u64::try_from(now_ms().saturating_sub(job.added)).unwrap_or(u64::MAX);
        debug!(
            job = %job.name,
            id = job.id,
            category = %job.category,
            elapsed_ms,
            ?outcome,
            "job finished"
        );
        self.job_pool.release(job);
    }

    fn register_schedule(
        &self,
        name: &str,
        category: QueueCategory,
        kind: ScheduleKind,
        task: Arc<dyn Fn() + Send + Sync>,
    ) -> Result<u32, DispatchError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(DispatchError::Shutdown);
        }
        let id = self.schedule_seq.fetch_add(1, Ordering::Relaxed);
        let now = now_ms();
        let schedule = JobSchedule {
            id,
            name: name.to_owned(),
            category,
            next_run: kind.next_after_ms(now),
            kind,
            last_run: 0,
            is_running: false,
        };
        self.schedules.queue_insert(id, schedule)?;
        self.tasks.lock().insert(id, task);
        self.wake();
        Ok(id)
    }
}

/// Tick thread: fire due schedules, then sleep until the next deadline or
/// an explicit wake.
fn tick_loop(inner: &Arc<Inner>) {
    debug!("dispatcher tick thread started");
    while !inner.shutdown.load(Ordering::Acquire) {
        let now = now_ms();
        for (id, schedule) in inner.schedules.snapshot() {
            if inner.shutdown.load(Ordering::Acquire) {
                break;
            }
            if schedule.next_run > now {
                continue;
            }
            // Advance the trigger before firing so a pending admission
            // does not re-fire on every tick.
            let advanced = schedule.kind.next_after_ms(now);
            if inner
                .schedules
                .queue_update_with(id, move |s| s.next_run = advanced)
                .is_err()
            {
                return;
            }
            let Some(task) = inner.tasks.lock().get(&id).cloned() else {
                continue;
            };
            let fire = Arc::clone(inner);
            let name = schedule.name;
            let category = schedule.category;
            // Admission may sleep in the throttle loop; keep it off the
            // tick thread so other schedules fire on time.
            let spawned = thread::Builder::new()
                .name("dispatch-admit".into())
                .spawn(move || {
                    let run: Box<dyn FnOnce() + Send> = Box::new(move || task());
                    match Inner::admit_and_submit(&fire, &name, category, Some(id), run) {
                        Ok(_) | Err(DispatchError::AlreadyQueued(_)) => {}
                        Err(e) => debug!(error = %e, "scheduled submission not admitted"),
                    }
                });
            if spawned.is_err() {
                warn!(schedule = id, "failed to spawn admission thread");
            }
        }
        let mut woken = inner.tick_flag.lock();
        if !*woken {
            let _ = inner.tick_cv.wait_for(&mut woken, TICK_WAIT);
        }
        *woken = false;
    }
    debug!("dispatcher tick thread exiting");
}

/// The job scheduler and dispatcher.
///
/// Owns the tick thread and the admission state; schedule and queue
/// bookkeeping lives in the two registries registered on the single-writer
/// manager by the embedder (see `builders`).
pub struct Dispatcher {
    inner: Arc<Inner>,
    tick: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Start the dispatcher over the given pools and registries.
    ///
    /// # Panics
    ///
    /// Panics if the tick thread cannot be spawned at process start.
    #[must_use]
    pub fn start(
        settings: &DispatcherSettings,
        pools: Arc<WorkerPools>,
        queue: SyncUintHandle<JobEntry>,
        schedules: SyncUintHandle<JobSchedule>,
    ) -> Self {
        let inner = Arc::new(Inner {
            submit_gap: Duration::from_millis(settings.submit_gap_ms),
            submit_retries: settings.submit_retries,
            pools,
            queue,
            schedules,
            tasks: Mutex::new(HashMap::new()),
            admission: Mutex::new(AdmissionState {
                last_submit: [None; QueueCategory::BUCKETS],
            }),
            job_pool: JobPool::new(64),
            job_seq: AtomicU32::new(1),
            schedule_seq: AtomicU32::new(1),
            shutdown: AtomicBool::new(false),
            tick_flag: Mutex::new(false),
            tick_cv: Condvar::new(),
        });
        let tick_inner = Arc::clone(&inner);
        let tick = thread::Builder::new()
            .name("dispatcher-tick".into())
            .spawn(move || tick_loop(&tick_inner))
            .expect("failed to spawn dispatcher tick thread");
        info!("dispatcher started");
        Self {
            inner,
            tick: Mutex::new(Some(tick)),
        }
    }

    /// Register a recurring cron trigger. Fails fast on a malformed
    /// expression.
    ///
    /// # Errors
    ///
    /// `DispatchError::InvalidCron` on parse failure, `Shutdown` after
    /// shutdown, `Sync` when registry bookkeeping fails.
    pub fn dispatch_cron(
        &self,
        spec: &str,
        name: &str,
        category: QueueCategory,
        task: impl Fn() + Send + Sync + 'static,
    ) -> Result<u32, DispatchError> {
        let plan = CronPlan::parse(spec)?;
        let id = self.inner.register_schedule(
            name,
            category,
            ScheduleKind::Cron(Arc::new(plan)),
            Arc::new(task),
        )?;
        info!(schedule = id, job = name, spec, "cron schedule registered");
        Ok(id)
    }

    /// Register a recurring fixed-interval trigger.
    ///
    /// # Errors
    ///
    /// `Shutdown` after shutdown, `Sync` when registry bookkeeping fails.
    pub fn dispatch_every(
        &self,
        every: Duration,
        name: &str,
        category: QueueCategory,
        task: impl Fn() + Send + Sync + 'static,
    ) -> Result<u32, DispatchError> {
        let id = self.inner.register_schedule(
            name,
            category,
            ScheduleKind::Interval(every),
            Arc::new(task),
        )?;
        info!(schedule = id, job = name, every_ms = every.as_millis() as u64, "interval schedule registered");
        Ok(id)
    }

    /// One-shot immediate submission through the same admission path.
    /// Blocks the caller for the admission decision (up to the throttle
    /// retry budget), not for the job's execution.
    ///
    /// # Errors
    ///
    /// `AlreadyQueued` when an alias-group sibling is running, `Throttled`
    /// when the retry budget is exhausted, `Shutdown` after shutdown.
    pub fn dispatch(
        &self,
        name: &str,
        category: QueueCategory,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<u32, DispatchError> {
        Inner::admit_and_submit(&self.inner, name, category, None, Box::new(task))
    }

    /// Snapshot of the queue registry, keyed by job name.
    #[must_use]
    pub fn queues(&self) -> HashMap<String, JobEntry> {
        self.inner
            .queue
            .snapshot()
            .into_values()
            .map(|e| (e.name.clone(), e))
            .collect()
    }

    /// Snapshot of the schedule registry, keyed by job name.
    #[must_use]
    pub fn schedules(&self) -> HashMap<String, JobSchedule> {
        self.inner
            .schedules
            .snapshot()
            .into_values()
            .map(|s| (s.name.clone(), s))
            .collect()
    }

    /// Set a job's cooperative cancellation flag. Returns false when the
    /// job is no longer (or never was) in the queue registry.
    pub fn cancel(&self, job_id: u32) -> bool {
        match self.inner.queue.get(job_id) {
            Some(entry) => {
                entry.cancelled.store(true, Ordering::Release);
                info!(job = %entry.name, id = job_id, "job cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Drain the queue registry, but only once every pool reports zero
    /// running and zero waiting work.
    pub fn clean_queue(&self) {
        if !self.inner.pools.idle() {
            debug!("clean_queue skipped: pools busy");
            return;
        }
        match self.inner.queue.queue_clear() {
            Ok(()) => info!("queue registry drained"),
            Err(e) => warn!(error = %e, "queue registry drain failed"),
        }
    }

    /// The worker pools this dispatcher submits to.
    #[must_use]
    pub fn pools(&self) -> &Arc<WorkerPools> {
        &self.inner.pools
    }

    /// Stop the tick thread and the pools. Idempotent. The registries'
    /// manager is owned by the embedder and is not touched.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.wake();
        if let Some(tick) = self.tick.lock().take() {
            if tick.join().is_err() {
                warn!("dispatcher tick thread panicked");
            }
        }
        self.inner.pools.shutdown();
        info!("dispatcher shut down");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if !self.inner.shutdown.swap(true, Ordering::AcqRel) {
            self.inner.wake();
            debug!("dispatcher dropped without explicit shutdown");
        }
    }
}
