//! Shared utilities for the venue reconciliation workspace.
//!
//! - [`ExponentialBackoff`] and [`RetryPolicy`]: delays between failed polls
//! - [`init_logging`]: installs the process-wide `tracing` subscriber (binaries only)

mod backoff;
mod logging;

pub use backoff::{ExponentialBackoff, RetryPolicy};
pub use logging::init_logging;
