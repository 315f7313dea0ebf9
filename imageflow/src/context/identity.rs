//! Run identity for tracking pipeline executions.

use crate::utils::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a single pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// Time-ordered unique ID for this run.
    pub run_id: Uuid,
    /// When the run was created.
    pub started_at: Timestamp,
    /// Optional builder name, for runs started by a named build.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_name: Option<String>,
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl RunIdentity {
    /// Creates a new run identity with a generated run ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            build_name: None,
        }
    }

    /// Sets the build name.
    #[must_use]
    pub fn with_build_name(mut self, name: impl Into<String>) -> Self {
        self.build_name = Some(name.into());
        self
    }

    /// Returns the run ID as a string.
    #[must_use]
    pub fn run_id_str(&self) -> String {
        self.run_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_identity_new() {
        let identity = RunIdentity::new();
        assert_eq!(identity.run_id.get_version_num(), 7);
        assert!(identity.build_name.is_none());
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunIdentity::new().run_id, RunIdentity::new().run_id);
    }

    #[test]
    fn test_run_identity_serialization() {
        let identity = RunIdentity::new().with_build_name("base-image");
        let json = serde_json::to_string(&identity).unwrap();
        let deserialized: RunIdentity = serde_json::from_str(&json).unwrap();

        assert_eq!(identity, deserialized);
    }
}
