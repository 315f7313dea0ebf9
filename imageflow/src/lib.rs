//! # Imageflow
//!
//! A step orchestration engine that builds virtual machine images by
//! driving an asynchronous cloud-compute API.
//!
//! Imageflow provides:
//!
//! - **Sequential steps**: create an instance, a disk and a boot config,
//!   boot, discover the address, provision, and convert the disk to an image
//! - **Compensation**: when a step halts, every completed step is undone in
//!   reverse order and cleanup failures are reported next to the cause
//! - **Job polling**: every remote job is polled to completion with a
//!   deadline, and remote failure messages are kept verbatim
//! - **Cancellation**: a shared token interrupts any wait, and cancelling
//!   waits for the unwind to finish
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use imageflow::prelude::*;
//!
//! let config = PipelineConfig::from_json(raw)?;
//! let builder = ImageBuilder::new(config, api, provisioner)?;
//!
//! let artifact = builder.run().await?;
//! println!("{artifact}");
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod client;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod jobs;
pub mod observability;
pub mod pipeline;
pub mod steps;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::client::{
        ComputeApi, ConnectTarget, InstanceId, InstanceStatus, JobId, JobStatus, Provisioner,
    };
    pub use crate::config::PipelineConfig;
    pub use crate::context::{RunIdentity, StateBag};
    pub use crate::core::{Artifact, StepOutcome};
    pub use crate::errors::{
        CompensationErrors, ConfigError, ErrorKind, ImageflowError, RemoteError,
    };
    pub use crate::events::{LoggingProgressSink, NoOpProgressSink, ProgressSink};
    pub use crate::jobs::{JobPoller, PollSettings};
    pub use crate::pipeline::{ImageBuilder, RunOutcome, RunReport, StepRunner};
    pub use crate::steps::{Step, StepContext};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
