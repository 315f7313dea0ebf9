//! Run-scoped context for pipeline execution.
//!
//! This module provides:
//! - The typed state bag threaded through every step
//! - The run identity used to correlate logs of a single run

mod identity;
mod state;

pub use identity::RunIdentity;
pub use state::{keys, StateBag};
