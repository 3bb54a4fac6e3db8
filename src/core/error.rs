//! Error types for the scheduling core.

use thiserror::Error;

/// Errors produced by the single-writer sync-ops manager.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The manager has been shut down; the operation was not applied.
    #[error("sync ops manager is shut down")]
    Closed,
    /// The writer thread is gone (panicked or exited) before replying.
    #[error("sync ops writer thread is gone")]
    WriterGone,
    /// The writer thread tried to queue an operation onto itself.
    /// Allowing this would deadlock the manager.
    #[error("operation queued from the writer thread")]
    ReentrantApply,
    /// A map was registered twice under the same label.
    #[error("map `{0}` already registered")]
    DuplicateMap(String),
}

/// Errors produced by job registration and admission.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The cron expression failed to parse; registration is refused.
    #[error("invalid cron expression: {0}")]
    InvalidCron(#[from] cron::error::Error),
    /// An alias-group sibling of this job is already queued and started.
    #[error("job `{0}` already queued")]
    AlreadyQueued(String),
    /// The submission throttle could not admit the job within its retry
    /// budget; the submission was abandoned.
    #[error("job `{0}` skipped: submission throttle exhausted")]
    Throttled(String),
    /// The dispatcher has been shut down.
    #[error("dispatcher is shut down")]
    Shutdown,
    /// Bookkeeping through the sync-ops manager failed.
    #[error("sync ops failure: {0}")]
    Sync(#[from] SyncError),
}

/// Errors produced by the bounded worker pools.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool has been shut down and accepts no further work.
    #[error("worker pool `{0}` has been shut down")]
    Shutdown(&'static str),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
