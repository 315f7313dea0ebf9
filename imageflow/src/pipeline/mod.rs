//! Pipeline execution.
//!
//! This module provides:
//! - The step runner with reverse-order compensation
//! - Run reports
//! - The image builder entry point

mod builder;
mod runner;

#[cfg(test)]
mod integration_tests;

pub use builder::ImageBuilder;
pub use runner::{RunOutcome, RunReport, StepRunner};
