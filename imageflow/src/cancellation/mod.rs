//! Cooperative cancellation for pipeline runs.
//!
//! A single [`CancellationToken`] is shared between the runner, every
//! blocking wait inside the steps, and whoever may request a stop (for
//! example a signal handler).

mod token;

pub use token::{CancellationToken, DEFAULT_CANCEL_REASON};
