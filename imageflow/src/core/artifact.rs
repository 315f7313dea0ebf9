//! The artifact produced by a successful run.

use crate::client::ImageId;
use crate::context::{keys, StateBag};
use crate::errors::{ConfigError, ImageflowError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier reported for artifacts produced by this engine.
pub const BUILDER_ID: &str = "imageflow";

/// Output descriptor of a successful pipeline run.
///
/// Only the image outlives the run; the instance and disk it was built on
/// are released during teardown and are not reported. Immutable once
/// constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    image_id: ImageId,
    image_label: String,
    created_at: String,
}

impl Artifact {
    /// Builds the artifact from the final state of a successful run.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the image was never recorded.
    pub fn from_state(state: &StateBag) -> Result<Self, ImageflowError> {
        let image_id = state.image_id().ok_or_else(|| {
            ConfigError::single(format!("Cannot find {} in state", keys::IMAGE_ID))
        })?;
        let image_label = state
            .image_label()
            .map_or_else(|| state.config().image_label.clone(), str::to_string);

        Ok(Self {
            image_id,
            image_label,
            created_at: crate::utils::iso_timestamp(),
        })
    }

    /// Returns the produced image.
    #[must_use]
    pub fn image_id(&self) -> ImageId {
        self.image_id
    }

    /// Returns the image label.
    #[must_use]
    pub fn image_label(&self) -> &str {
        &self.image_label
    }

    /// Returns when the artifact was created (ISO 8601).
    #[must_use]
    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    /// Returns the identifier of the producing builder.
    #[must_use]
    pub fn builder_id(&self) -> &'static str {
        BUILDER_ID
    }

    /// Returns the artifact ID (the image ID as a string).
    #[must_use]
    pub fn id(&self) -> String {
        self.image_id.to_string()
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image: {} ({})", self.image_id, self.image_label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{DiskId, InstanceId};
    use crate::config::PipelineConfig;
    use crate::errors::ErrorKind;
    use std::sync::Arc;

    fn state() -> StateBag {
        let config = PipelineConfig::default().with_image_label("fallback");
        StateBag::new(Arc::new(config))
    }

    #[test]
    fn test_artifact_from_state() {
        let mut state = state();
        state.set_instance_id(InstanceId(7));
        state.set_disk_id(DiskId(3));
        state.set_image(ImageId(99), "golden");

        let artifact = Artifact::from_state(&state).unwrap();

        assert_eq!(artifact.image_id(), ImageId(99));
        assert_eq!(artifact.image_label(), "golden");
        assert_eq!(artifact.id(), "99");
        assert_eq!(artifact.builder_id(), "imageflow");
        assert_eq!(artifact.to_string(), "Image: 99 (golden)");

        let json = serde_json::to_value(&artifact).unwrap();
        assert!(json.get("instance_id").is_none());
        assert!(json.get("disk_id").is_none());
    }

    #[test]
    fn test_artifact_requires_image_id() {
        let err = Artifact::from_state(&state()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "Cannot find image-id in state");
    }

    #[test]
    fn test_artifact_serialization() {
        let mut state = state();
        state.set_image(ImageId(5), "x");
        let artifact = Artifact::from_state(&state).unwrap();

        let json = serde_json::to_string(&artifact).unwrap();
        let deserialized: Artifact = serde_json::from_str(&json).unwrap();

        assert_eq!(artifact, deserialized);
    }
}
