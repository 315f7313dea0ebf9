//! Core domain model types for imageflow.
//!
//! This module contains:
//! - The outcome a step reports to the runner
//! - The artifact produced by a successful run

mod artifact;
mod outcome;

pub use artifact::{Artifact, BUILDER_ID};
pub use outcome::StepOutcome;
