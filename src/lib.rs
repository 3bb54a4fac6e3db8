//! # Fetcharr Core
//!
//! The concurrency and scheduling substrate of a media-acquisition
//! automation backend.
//!
//! Everything the backend does around its library happens as named
//! recurring jobs: indexer RSS sweeps, missing-item and upgrade searches,
//! file-system scans, metadata refreshes. This crate provides the layer
//! those jobs run on, without any of the domain logic itself.
//!
//! ## What it provides
//!
//! - **Single-writer map manager**: every mutation of a registered
//!   concurrent map funnels through one dedicated writer thread over a
//!   bounded mailbox, giving one global FIFO application order while reads
//!   stay direct ([`manager::SyncOps`]).
//! - **Concurrent maps**: a string-keyed map carrying per-entry expiry,
//!   flag and last-scan metadata ([`core::SyncMap`]) and a bare
//!   `u32`-keyed map ([`core::SyncMapUint`]).
//! - **Job scheduler and dispatcher**: cron and interval triggers feeding
//!   five bounded worker pools, with alias-group de-duplication and a
//!   per-category submission throttle ([`scheduler::Dispatcher`]).
//! - **Sliding-window rate limiter** with cooperative backoff, for pacing
//!   calls against external indexers ([`core::SlidingWindowLimiter`]).
//!
//! ## Getting started
//!
//! ```rust
//! use fetcharr_core::builders::CoreBuilder;
//! use fetcharr_core::scheduler::QueueCategory;
//!
//! let core = CoreBuilder::new().build().unwrap();
//!
//! core.dispatcher()
//!     .dispatch_cron("0 */6 * * *", "refreshfeeds", QueueCategory::Feeds, || {
//!         // fetch and import feeds
//!     })
//!     .unwrap();
//!
//! core.dispatcher()
//!     .dispatch("searchmissinginc_movies", QueueCategory::Search, || {
//!         // run one missing-items search now
//!     })
//!     .unwrap();
//!
//! core.shutdown();
//! ```
//!
//! For complete examples, see `tests/dispatcher_test.rs` and
//! `tests/sync_ops_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

/// Concurrent maps, the rate limiter, and error types.
pub mod core;
/// Configuration models for the dispatcher and pools.
pub mod config;
/// Builders to construct the scheduling core from configuration.
pub mod builders;
/// Single-writer synchronization manager and typed map handles.
pub mod manager;
/// Cron/interval scheduling, admission control, and worker pools.
pub mod scheduler;
/// Shared utilities.
pub mod util;
