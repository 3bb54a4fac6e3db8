//! Configuration models for the dispatcher, pools, and manager.

/// Dispatcher and pool settings.
pub mod settings;

pub use settings::{DispatcherSettings, PoolSettings, PoolsSettings};
