//! Testing utilities for imageflow pipelines.
//!
//! This module provides:
//! - A scriptable in-memory compute API
//! - Recording steps for runner tests
//! - Fixtures and assertions

mod assertions;
mod fixtures;
mod mocks;
mod scripted;

pub use assertions::{
    assert_compensated, assert_error_contains, assert_error_kind, assert_log,
    assert_no_compensation,
};
pub use fixtures::{test_config, StepHarness};
pub use mocks::{step_log, RecordingStep, StepLog};
#[cfg(test)]
pub use mocks::{HangingProvisioner, MockProvisioner};
pub use scripted::{ApiCall, Operation, ScriptedComputeApi, FIRST_JOB_ID};
