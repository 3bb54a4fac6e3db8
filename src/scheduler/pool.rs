//! Bounded worker pools executing job closures on dedicated OS threads.
//!
//! Five independent pools (indexer, parse, search, files, metadata), each
//! with a fixed worker count and an advisory capacity ceiling: exceeding
//! the ceiling is logged at error level but the job is still accepted,
//! trading strict admission for availability. Panics inside a job closure
//! are caught and counted, never propagated, so one bad job cannot take a
//! pool down.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::PoolsSettings;
use crate::core::PoolError;

/// The five executor classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// Indexer maintenance and queries.
    Indexer,
    /// Release-name parsing.
    Parse,
    /// External searches.
    Search,
    /// File-system scans.
    Files,
    /// Metadata refreshes and feed imports.
    Metadata,
}

impl PoolKind {
    /// All pool kinds, in array index order.
    pub const ALL: [Self; 5] = [
        Self::Indexer,
        Self::Parse,
        Self::Search,
        Self::Files,
        Self::Metadata,
    ];

    /// Stable lowercase name for logs and thread names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Indexer => "indexer",
            Self::Parse => "parse",
            Self::Search => "search",
            Self::Files => "files",
            Self::Metadata => "metadata",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Indexer => 0,
            Self::Parse => 1,
            Self::Search => 2,
            Self::Files => 3,
            Self::Metadata => 4,
        }
    }
}

/// How a job left its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The closure ran to completion.
    Completed,
    /// The closure panicked; the panic was caught and logged.
    Panicked,
    /// The cancellation flag was set before the closure started; it was
    /// skipped.
    Cancelled,
}

/// A unit of work handed to a pool: the job closure plus the completion
/// callback that unwinds the dispatcher's bookkeeping. The callback runs
/// unconditionally, whatever the outcome.
pub(crate) struct PoolJob {
    pub name: String,
    pub cancelled: Arc<AtomicBool>,
    pub run: Box<dyn FnOnce() + Send>,
    pub done: Box<dyn FnOnce(JobOutcome) + Send>,
}

/// Lock-free pool counters.
#[derive(Default)]
struct PoolCounters {
    submitted: AtomicU64,
    queued: AtomicU64,
    active: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
    cancelled: AtomicU64,
}

/// Snapshot of one pool's utilization.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Which pool this snapshot describes.
    pub kind: PoolKind,
    /// Worker thread count.
    pub workers: usize,
    /// Advisory capacity ceiling.
    pub capacity: usize,
    /// Jobs waiting in the feed channel.
    pub queued: u64,
    /// Jobs currently executing.
    pub active: u64,
    /// Jobs accepted since start.
    pub submitted: u64,
    /// Jobs that ran to completion.
    pub completed: u64,
    /// Jobs whose closure panicked.
    pub panicked: u64,
    /// Jobs skipped because they were cancelled before starting.
    pub cancelled: u64,
}

struct Pool {
    kind: PoolKind,
    worker_count: usize,
    capacity: usize,
    tx: Mutex<Option<Sender<PoolJob>>>,
    counters: Arc<PoolCounters>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Pool {
    fn spawn(kind: PoolKind, worker_count: usize, capacity: usize) -> Self {
        let (tx, rx) = unbounded::<PoolJob>();
        let counters = Arc::new(PoolCounters::default());
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            workers.push(spawn_worker(kind, worker_id, rx.clone(), Arc::clone(&counters)));
        }
        debug!(pool = kind.name(), workers = worker_count, capacity, "worker pool started");
        Self {
            kind,
            worker_count,
            capacity,
            tx: Mutex::new(Some(tx)),
            counters,
            workers: Mutex::new(workers),
        }
    }

    fn submit(&self, job: PoolJob) -> Result<(), PoolError> {
        let outstanding = self.counters.queued.load(Ordering::Relaxed)
            + self.counters.active.load(Ordering::Relaxed);
        if outstanding >= self.capacity as u64 {
            // Advisory only: log loudly, accept anyway.
            error!(
                pool = self.kind.name(),
                job = %job.name,
                outstanding,
                capacity = self.capacity,
                "pool over capacity, accepting anyway"
            );
        }
        let tx_guard = self.tx.lock();
        let Some(tx) = tx_guard.as_ref() else {
            return Err(PoolError::Shutdown(self.kind.name()));
        };
        // Count before sending: a worker may pick the job up and decrement
        // before send() even returns.
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        match tx.send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => {
                self.counters.queued.fetch_sub(1, Ordering::SeqCst);
                Err(PoolError::Shutdown(self.kind.name()))
            }
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            kind: self.kind,
            workers: self.worker_count,
            capacity: self.capacity,
            queued: self.counters.queued.load(Ordering::Relaxed),
            active: self.counters.active.load(Ordering::Relaxed),
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
        }
    }

    fn close_feed(&self) {
        *self.tx.lock() = None;
    }

    /// Join workers up to `deadline`; stragglers are detached, not killed.
    fn join_until(&self, deadline: Instant) {
        let mut workers = self.workers.lock();
        for (idx, worker) in workers.drain(..).enumerate() {
            let remaining = deadline
                .saturating_duration_since(Instant::now())
                .max(Duration::from_millis(1));
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            let helper = thread::spawn(move || {
                let clean = worker.join().is_ok();
                let _ = done_tx.send(clean);
            });
            match done_rx.recv_timeout(remaining) {
                Ok(true) => {
                    let _ = helper.join();
                    debug!(pool = self.kind.name(), worker = idx, "worker joined");
                }
                Ok(false) => {
                    let _ = helper.join();
                    warn!(pool = self.kind.name(), worker = idx, "worker panicked");
                }
                Err(_) => {
                    // Job still running past the shutdown ceiling; abandon
                    // the thread rather than block shutdown.
                    warn!(
                        pool = self.kind.name(),
                        worker = idx,
                        "worker did not exit within shutdown timeout, detaching"
                    );
                }
            }
        }
    }
}

fn spawn_worker(
    kind: PoolKind,
    worker_id: usize,
    rx: Receiver<PoolJob>,
    counters: Arc<PoolCounters>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("{}-worker-{worker_id}", kind.name()))
        .spawn(move || {
            // Blocking recv; sender drop ends the loop.
            while let Ok(job) = rx.recv() {
                // active rises before queued falls so the pair never reads
                // as fully idle while a job is in flight.
                counters.active.fetch_add(1, Ordering::SeqCst);
                counters.queued.fetch_sub(1, Ordering::SeqCst);
                let PoolJob {
                    name,
                    cancelled,
                    run,
                    done,
                } = job;

                let outcome = if cancelled.load(Ordering::Acquire) {
                    debug!(pool = kind.name(), job = %name, "job cancelled before start, skipping");
                    counters.cancelled.fetch_add(1, Ordering::Relaxed);
                    JobOutcome::Cancelled
                } else {
                    debug!(pool = kind.name(), job = %name, "job starting");
                    match catch_unwind(AssertUnwindSafe(run)) {
                        Ok(()) => {
                            counters.completed.fetch_add(1, Ordering::Relaxed);
                            JobOutcome::Completed
                        }
                        Err(_) => {
                            error!(pool = kind.name(), job = %name, "job panicked, recovered");
                            counters.panicked.fetch_add(1, Ordering::Relaxed);
                            JobOutcome::Panicked
                        }
                    }
                };

                // Completion bookkeeping must run on every outcome; a
                // panicking callback would strand queue entries, so it is
                // contained too.
                if catch_unwind(AssertUnwindSafe(move || done(outcome))).is_err() {
                    error!(pool = kind.name(), job = %name, "job completion callback panicked");
                }
                counters.active.fetch_sub(1, Ordering::SeqCst);
            }
            debug!(pool = kind.name(), worker = worker_id, "worker exiting");
        })
        .expect("failed to spawn pool worker thread")
}

/// The five bounded executors as one unit.
pub struct WorkerPools {
    pools: [Pool; 5],
    shutdown: AtomicBool,
    shutdown_timeout: Duration,
}

impl WorkerPools {
    /// Spawn all five pools from settings.
    #[must_use]
    pub fn start(settings: &PoolsSettings, shutdown_timeout: Duration) -> Self {
        let make = |kind: PoolKind| {
            let s = settings.of(kind);
            Pool::spawn(kind, s.workers, s.capacity)
        };
        Self {
            pools: [
                make(PoolKind::Indexer),
                make(PoolKind::Parse),
                make(PoolKind::Search),
                make(PoolKind::Files),
                make(PoolKind::Metadata),
            ],
            shutdown: AtomicBool::new(false),
            shutdown_timeout,
        }
    }

    pub(crate) fn submit(&self, kind: PoolKind, job: PoolJob) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::Shutdown(kind.name()));
        }
        self.pools[kind.index()].submit(job)
    }

    /// Utilization snapshot of one pool.
    #[must_use]
    pub fn stats(&self, kind: PoolKind) -> PoolStats {
        self.pools[kind.index()].stats()
    }

    /// Utilization snapshots of all pools.
    #[must_use]
    pub fn all_stats(&self) -> Vec<PoolStats> {
        self.pools.iter().map(Pool::stats).collect()
    }

    /// True when every pool reports zero running and zero waiting work.
    #[must_use]
    pub fn idle(&self) -> bool {
        self.pools.iter().all(|p| {
            p.counters.active.load(Ordering::SeqCst) == 0
                && p.counters.queued.load(Ordering::SeqCst) == 0
        })
    }

    /// Stop all pools: close the feeds, then wait for in-flight work with
    /// a hard per-pool ceiling. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down worker pools");
        for pool in &self.pools {
            pool.close_feed();
        }
        for pool in &self.pools {
            let deadline = Instant::now() + self.shutdown_timeout;
            pool.join_until(deadline);
        }
        info!("worker pools shut down");
    }
}

impl Drop for WorkerPools {
    fn drop(&mut self) {
        // Close feeds so workers drain and exit; no joining in drop.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            for pool in &self.pools {
                pool.close_feed();
            }
            debug!("worker pools dropped without explicit shutdown, workers detached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolsSettings;
    use std::sync::atomic::AtomicUsize;

    fn small_pools() -> WorkerPools {
        let mut settings = PoolsSettings::default();
        settings.search.workers = 2;
        settings.search.capacity = 4;
        WorkerPools::start(&settings, Duration::from_secs(5))
    }

    fn job(
        name: &str,
        ran: &Arc<AtomicUsize>,
        done: &Arc<AtomicUsize>,
    ) -> PoolJob {
        let ran = Arc::clone(ran);
        let done = Arc::clone(done);
        PoolJob {
            name: name.to_owned(),
            cancelled: Arc::new(AtomicBool::new(false)),
            run: Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }),
            done: Box::new(move |_| {
                done.fetch_add(1, Ordering::SeqCst);
            }),
        }
    }

    fn wait_idle(pools: &WorkerPools) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !pools.idle() {
            assert!(Instant::now() < deadline, "pools did not go idle");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn executes_jobs_and_runs_completion() {
        let pools = small_pools();
        let ran = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        for i in 0..8 {
            pools
                .submit(PoolKind::Search, job(&format!("job-{i}"), &ran, &done))
                .unwrap();
        }
        wait_idle(&pools);
        assert_eq!(ran.load(Ordering::SeqCst), 8);
        assert_eq!(done.load(Ordering::SeqCst), 8);
        pools.shutdown();
    }

    #[test]
    fn over_capacity_is_accepted() {
        let pools = small_pools();
        let ran = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        // Far beyond the advisory capacity of 4.
        for i in 0..20 {
            pools
                .submit(PoolKind::Search, job(&format!("burst-{i}"), &ran, &done))
                .unwrap();
        }
        wait_idle(&pools);
        assert_eq!(ran.load(Ordering::SeqCst), 20);
        pools.shutdown();
    }

    #[test]
    fn panic_is_contained_and_completion_still_runs() {
        let pools = small_pools();
        let done = Arc::new(AtomicUsize::new(0));
        let done2 = Arc::clone(&done);
        pools
            .submit(
                PoolKind::Search,
                PoolJob {
                    name: "boom".into(),
                    cancelled: Arc::new(AtomicBool::new(false)),
                    run: Box::new(|| panic!("bad job")),
                    done: Box::new(move |outcome| {
                        assert_eq!(outcome, JobOutcome::Panicked);
                        done2.fetch_add(1, Ordering::SeqCst);
                    }),
                },
            )
            .unwrap();
        wait_idle(&pools);
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(pools.stats(PoolKind::Search).panicked, 1);
        pools.shutdown();
    }

    #[test]
    fn cancelled_job_is_skipped() {
        let pools = small_pools();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        pools
            .submit(
                PoolKind::Search,
                PoolJob {
                    name: "cancelled".into(),
                    cancelled: Arc::new(AtomicBool::new(true)),
                    run: Box::new(move || {
                        ran2.fetch_add(1, Ordering::SeqCst);
                    }),
                    done: Box::new(move |outcome| {
                        assert_eq!(outcome, JobOutcome::Cancelled);
                        seen2.fetch_add(1, Ordering::SeqCst);
                    }),
                },
            )
            .unwrap();
        wait_idle(&pools);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        pools.shutdown();
    }

    #[test]
    fn never_idle_between_submission_and_completion() {
        let pools = small_pools();
        // Repeated fast cycles to give the worker every chance to race the
        // counter updates; from submit returning until the completion
        // callback has run, the pools must report busy.
        for i in 0..200 {
            let done = Arc::new(AtomicUsize::new(0));
            let seen = Arc::clone(&done);
            pools
                .submit(
                    PoolKind::Search,
                    PoolJob {
                        name: format!("cycle-{i}"),
                        cancelled: Arc::new(AtomicBool::new(false)),
                        run: Box::new(|| {}),
                        done: Box::new(move |_| {
                            seen.fetch_add(1, Ordering::SeqCst);
                        }),
                    },
                )
                .unwrap();
            while done.load(Ordering::SeqCst) == 0 {
                assert!(!pools.idle(), "pool reported idle with a job in flight");
            }
        }
        wait_idle(&pools);
        pools.shutdown();
    }

    #[test]
    fn submit_after_shutdown_is_refused() {
        let pools = small_pools();
        pools.shutdown();
        let ran = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let err = pools.submit(PoolKind::Files, job("late", &ran, &done));
        assert!(matches!(err, Err(PoolError::Shutdown(_))));
    }
}
