//! Step outcome reported to the runner.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a step's run action asks the runner to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Proceed to the next step.
    Continue,
    /// Stop immediately; previously completed steps are compensated.
    Halt,
    /// An external stop was observed; handled like `Halt`.
    Cancelled,
}

impl StepOutcome {
    /// Returns true if the pipeline may proceed.
    #[must_use]
    pub const fn is_continue(self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Returns true if the pipeline must stop and unwind.
    #[must_use]
    pub const fn is_stop(self) -> bool {
        !self.is_continue()
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Halt => write!(f, "halt"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
