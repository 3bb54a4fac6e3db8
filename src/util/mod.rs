//! Shared utilities.

/// Millisecond clock helpers.
pub mod clock;
/// Telemetry helpers for structured logging.
pub mod telemetry;

pub use clock::*;
pub use telemetry::*;
