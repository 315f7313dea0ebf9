//! Progress sink system.
//!
//! Steps report human-readable progress and error lines at each transition.
//! The sink is a one-way notification channel; the pipeline never queries it.

mod sink;

pub use sink::{
    CollectingProgressSink, LoggingProgressSink, NoOpProgressSink, ProgressLevel, ProgressLine,
    ProgressSink,
};
