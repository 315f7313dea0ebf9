//! Observability utilities.
//!
//! The engine logs through `tracing`; this module installs a subscriber
//! for binaries and tests that want the output.

mod subscriber;

pub use subscriber::{init_test_tracing, init_tracing, LogFormat, DEFAULT_FILTER};
