//! Test assertions for runs and errors.

use super::StepLog;
use crate::errors::{ErrorKind, ImageflowError};

/// Asserts that `log` holds exactly `expected`, in order.
pub fn assert_log(log: &StepLog, expected: &[&str]) {
    let actual = log.lock().clone();
    assert_eq!(actual, expected, "Unexpected step log");
}

/// Asserts that no step was compensated.
pub fn assert_no_compensation(log: &StepLog) {
    let compensated: Vec<String> = log
        .lock()
        .iter()
        .filter(|entry| entry.starts_with("compensate:"))
        .cloned()
        .collect();
    assert!(
        compensated.is_empty(),
        "Expected no compensation, got {compensated:?}"
    );
}

/// Asserts that exactly `steps` were compensated, in that order.
pub fn assert_compensated(log: &StepLog, steps: &[&str]) {
    let compensated: Vec<String> = log
        .lock()
        .iter()
        .filter_map(|entry| entry.strip_prefix("compensate:"))
        .map(str::to_string)
        .collect();
    assert_eq!(compensated, steps, "Unexpected compensation order");
}

/// Asserts the classification of an error.
pub fn assert_error_kind(error: &ImageflowError, expected: ErrorKind) {
    assert_eq!(
        error.kind(),
        expected,
        "Expected {expected} error, got {:?}: {error}",
        error.kind()
    );
}

/// Asserts that an error's text contains `needle`.
pub fn assert_error_contains(error: &ImageflowError, needle: &str) {
    let rendered = error.to_string();
    assert!(
        rendered.contains(needle),
        "Expected error containing {needle:?}, got {rendered:?}"
    );
}
