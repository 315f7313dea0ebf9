//! Default label generation.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Prefix for every generated label.
pub const LABEL_PREFIX: &str = "imageflow";

/// Returns the current UTC time as an ISO 8601 formatted string.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Label for transient resources: `imageflow-<time-ordered uuid>`.
#[must_use]
pub fn default_instance_label() -> String {
    format!("{LABEL_PREFIX}-{}", Uuid::now_v7())
}

/// Label for the produced image: `imageflow-<unix seconds>`.
#[must_use]
pub fn default_image_label() -> String {
    format!("{LABEL_PREFIX}-{}", Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_labels_are_time_ordered_and_unique() {
        let first = default_instance_label();
        let second = default_instance_label();

        assert_ne!(first, second);
        let id = Uuid::parse_str(first.trim_start_matches("imageflow-")).unwrap();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_image_label_uses_unix_seconds() {
        let label = default_image_label();
        let seconds: i64 = label.trim_start_matches("imageflow-").parse().unwrap();
        assert!(seconds > 1_600_000_000);
    }
}
