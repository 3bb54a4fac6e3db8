//! Assembly of the scheduling core from configuration.

/// Builder wiring the manager, pools and dispatcher together.
pub mod core_builder;

pub use core_builder::{Core, CoreBuilder};
