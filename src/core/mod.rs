//! Leaf primitives: errors, the sliding-window limiter, and the concurrent
//! keyed stores the rest of the crate is built on.

/// Error types for the scheduling core.
pub mod error;
/// Sliding-window admission control.
pub mod limiter;
/// String-keyed concurrent store with cache metadata.
pub mod sync_map;
/// Uint32-keyed concurrent store.
pub mod sync_map_uint;

pub use error::{AppResult, DispatchError, PoolError, SyncError};
pub use limiter::{Admission, PairedLimiter, SlidingWindowLimiter};
pub use sync_map::{ExpiresAt, SyncMap};
pub use sync_map_uint::SyncMapUint;
