//! Waiting on asynchronous remote work.
//!
//! Every long-running remote operation returns a job handle that must be
//! polled until it reaches a terminal state. Polling is bounded by a
//! deadline and interrupted promptly by cancellation.

mod poller;

pub use poller::{poll_until, JobCompletion, JobPoller, PollSettings};
