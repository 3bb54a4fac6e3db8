//! Single-writer synchronization manager.
//!
//! `SyncOps` owns one dedicated writer thread and a bounded operation
//! mailbox. Every mutation of a registered map is expressed as a typed
//! closure, queued onto the mailbox, and executed only by the writer
//! thread; the caller blocks on a per-call reply channel until the writer
//! has applied it. This gives one global FIFO application order across all
//! maps registered on the manager, without per-map locking discipline.
//!
//! Reads never go through the mailbox: map handles expose the underlying
//! store directly and reads take its shared lock. A read racing a queued
//! write may observe pre- or post-write state (eventual, not linearizable,
//! visibility).
//!
//! The manager is an explicitly constructed service object, not a
//! process-global singleton, and map dispatch is typed end to end: a
//! handle can only queue operations against the concrete map it was
//! created for, so mismatched-type operations cannot be expressed, let
//! alone silently dropped. Failures surface as [`SyncError`] instead of
//! log-and-continue.

mod handle;

pub use handle::{SyncMapHandle, SyncUintHandle};

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::core::{SyncError, SyncMap, SyncMapUint};

/// Default operation mailbox depth.
pub const DEFAULT_OPS_QUEUE_DEPTH: usize = 100;

/// Sleep between enqueue retries when the mailbox is full. Guarantees
/// eventual delivery at the cost of unbounded caller blocking under
/// sustained overload; a documented risk, not mitigated.
const FULL_RETRY_SLEEP: Duration = Duration::from_millis(10);

/// One queued mutation: a label pair for tracing plus the typed closure
/// the writer executes.
struct Envelope {
    map: Arc<str>,
    kind: &'static str,
    run: Box<dyn FnOnce() + Send>,
}

enum Message {
    Apply(Envelope),
    Stop,
}

/// Cloneable client side of the writer mailbox, embedded in every handle.
#[derive(Clone)]
pub(crate) struct OpsClient {
    tx: Sender<Message>,
    shutdown: Arc<AtomicBool>,
    writer_id: ThreadId,
}

impl OpsClient {
    /// Queue one operation, retrying on a full mailbox until delivered.
    pub(crate) fn enqueue(
        &self,
        map: &Arc<str>,
        kind: &'static str,
        run: Box<dyn FnOnce() + Send>,
    ) -> Result<(), SyncError> {
        // The writer must never queue onto itself: with the mailbox full
        // that is a self-deadlock. Refuse instead.
        if thread::current().id() == self.writer_id {
            warn!(map = %map, op = kind, "operation queued from writer thread refused");
            return Err(SyncError::ReentrantApply);
        }
        let mut message = Message::Apply(Envelope {
            map: Arc::clone(map),
            kind,
            run,
        });
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(SyncError::Closed);
            }
            match self.tx.try_send(message) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(back)) => {
                    trace!(map = %map, op = kind, "ops mailbox full, retrying");
                    message = back;
                    thread::sleep(FULL_RETRY_SLEEP);
                }
                Err(TrySendError::Disconnected(_)) => return Err(SyncError::Closed),
            }
        }
    }

    /// Queue an operation and block until the writer has applied it,
    /// returning the operation's result.
    pub(crate) fn round_trip<R: Send + 'static>(
        &self,
        map: &Arc<str>,
        kind: &'static str,
        op: impl FnOnce() -> R + Send + 'static,
    ) -> Result<R, SyncError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.enqueue(
            map,
            kind,
            Box::new(move || {
                let _ = reply_tx.send(op());
            }),
        )?;
        // Writer exiting mid-flight drops the envelope and with it our
        // reply sender.
        reply_rx.recv().map_err(|_| SyncError::WriterGone)
    }
}

/// The single-writer synchronization manager.
///
/// Construct one per process at startup and pass it by reference to every
/// subsystem that registers a concurrent map. Dropping the manager without
/// [`SyncOps::shutdown`] detaches the writer thread.
pub struct SyncOps {
    client: OpsClient,
    writer: Mutex<Option<JoinHandle<()>>>,
    labels: Mutex<HashSet<String>>,
}

impl SyncOps {
    /// Start the manager with the default mailbox depth.
    #[must_use]
    pub fn start() -> Self {
        Self::with_queue_depth(DEFAULT_OPS_QUEUE_DEPTH)
    }

    /// Start the manager with an explicit mailbox depth.
    ///
    /// # Panics
    ///
    /// Panics if the writer thread cannot be spawned; this happens once at
    /// process start and means the process cannot run at all.
    #[must_use]
    pub fn with_queue_depth(depth: usize) -> Self {
        let (tx, rx) = bounded::<Message>(depth.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let writer = thread::Builder::new()
            .name("syncops-writer".into())
            .spawn(move || writer_loop(&rx))
            .expect("failed to spawn syncops writer thread");
        let writer_id = writer.thread().id();
        info!(depth, "sync ops manager started");
        Self {
            client: OpsClient {
                tx,
                shutdown,
                writer_id,
            },
            writer: Mutex::new(Some(writer)),
            labels: Mutex::new(HashSet::new()),
        }
    }

    /// Register a string-keyed map under `label` and obtain its typed
    /// handle. All mutation of the map should flow through the handle.
    ///
    /// # Errors
    ///
    /// `SyncError::DuplicateMap` when the label is already taken,
    /// `SyncError::Closed` after shutdown.
    pub fn register_map<T>(
        &self,
        label: impl Into<String>,
        map: SyncMap<T>,
    ) -> Result<SyncMapHandle<T>, SyncError>
    where
        T: Send + Sync + 'static,
    {
        let label = self.claim_label(label.into())?;
        debug!(map = %label, "registered sync map");
        Ok(SyncMapHandle::new(label, Arc::new(map), self.client.clone()))
    }

    /// Register a uint32-keyed map under `label` and obtain its typed
    /// handle.
    ///
    /// # Errors
    ///
    /// `SyncError::DuplicateMap` when the label is already taken,
    /// `SyncError::Closed` after shutdown.
    pub fn register_uint_map<T>(
        &self,
        label: impl Into<String>,
        map: SyncMapUint<T>,
    ) -> Result<SyncUintHandle<T>, SyncError>
    where
        T: Send + Sync + 'static,
    {
        let label = self.claim_label(label.into())?;
        debug!(map = %label, "registered sync uint map");
        Ok(SyncUintHandle::new(label, Arc::new(map), self.client.clone()))
    }

    /// Labels of all registered maps.
    pub fn registered(&self) -> Vec<String> {
        self.labels.lock().iter().cloned().collect()
    }

    /// True once [`SyncOps::shutdown`] has run.
    pub fn is_shut_down(&self) -> bool {
        self.client.shutdown.load(Ordering::Acquire)
    }

    /// Stop the writer thread. Idempotent. Operations already in the
    /// mailbox are applied before the writer exits; operations queued
    /// afterwards fail with [`SyncError::Closed`].
    pub fn shutdown(&self) {
        if self.client.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        // Blocking send: the stop marker must land even when the mailbox
        // is momentarily full.
        let _ = self.client.tx.send(Message::Stop);
        if let Some(writer) = self.writer.lock().take() {
            if writer.join().is_err() {
                warn!("sync ops writer thread panicked");
            }
        }
        info!("sync ops manager shut down");
    }

    fn claim_label(&self, label: String) -> Result<Arc<str>, SyncError> {
        if self.is_shut_down() {
            return Err(SyncError::Closed);
        }
        let mut labels = self.labels.lock();
        if !labels.insert(label.clone()) {
            return Err(SyncError::DuplicateMap(label));
        }
        Ok(Arc::from(label))
    }
}

impl Drop for SyncOps {
    fn drop(&mut self) {
        if !self.client.shutdown.swap(true, Ordering::AcqRel) {
            let _ = self.client.tx.send(Message::Stop);
            // Writer is detached; it drains up to the stop marker and
            // exits on its own.
            debug!("sync ops manager dropped without explicit shutdown");
        }
    }
}

/// Writer loop: one operation at a time, in mailbox FIFO order.
fn writer_loop(rx: &Receiver<Message>) {
    debug!("sync ops writer started");
    for message in rx {
        match message {
            Message::Apply(envelope) => {
                trace!(map = %envelope.map, op = envelope.kind, "applying");
                (envelope.run)();
            }
            Message::Stop => break,
        }
    }
    debug!("sync ops writer exiting");
}
