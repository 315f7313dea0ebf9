//! The run-scoped state bag threaded through the pipeline.

use super::RunIdentity;
use crate::client::{BootConfigId, DiskId, ImageId, InstanceId, JobId};
use crate::config::PipelineConfig;
use crate::errors::ImageflowError;
use std::sync::Arc;

/// Key names of the entries a [`StateBag`] carries, used in diagnostics.
pub mod keys {
    /// Created instance.
    pub const INSTANCE_ID: &str = "instance-id";
    /// Created disk.
    pub const DISK_ID: &str = "disk-id";
    /// Created boot configuration.
    pub const BOOT_CONFIG_ID: &str = "boot-config-id";
    /// Most recent remote job.
    pub const JOB_ID: &str = "job-id";
    /// Discovered instance address.
    pub const INSTANCE_ADDRESS: &str = "instance-address";
    /// Halting error.
    pub const ERROR: &str = "error";
    /// Produced image.
    pub const IMAGE_ID: &str = "image-id";
    /// Produced image label.
    pub const IMAGE_LABEL: &str = "image-label";
}

/// Strongly-typed state for one pipeline run.
///
/// Every entry has a fixed type, so a later step can never read back a
/// value stored under an incompatible type. A bag is created fresh per run
/// and owned by the single pipeline task.
#[derive(Debug)]
pub struct StateBag {
    identity: RunIdentity,
    config: Arc<PipelineConfig>,
    instance_id: Option<InstanceId>,
    disk_id: Option<DiskId>,
    boot_config_id: Option<BootConfigId>,
    job_id: Option<JobId>,
    instance_address: Option<String>,
    image_id: Option<ImageId>,
    image_label: Option<String>,
    error: Option<ImageflowError>,
}

impl StateBag {
    /// Creates an empty bag for a run of `config`.
    #[must_use]
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self::with_identity(config, RunIdentity::new())
    }

    /// Creates an empty bag with an explicit identity.
    #[must_use]
    pub fn with_identity(config: Arc<PipelineConfig>, identity: RunIdentity) -> Self {
        Self {
            identity,
            config,
            instance_id: None,
            disk_id: None,
            boot_config_id: None,
            job_id: None,
            instance_address: None,
            image_id: None,
            image_label: None,
            error: None,
        }
    }

    /// Returns the run identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the created instance, if any.
    #[must_use]
    pub fn instance_id(&self) -> Option<InstanceId> {
        self.instance_id
    }

    /// Returns the created instance or a missing-state error.
    pub fn require_instance_id(&self) -> Result<InstanceId, ImageflowError> {
        self.instance_id
            .ok_or(ImageflowError::MissingState(keys::INSTANCE_ID))
    }

    /// Records the created instance.
    pub fn set_instance_id(&mut self, id: InstanceId) {
        self.instance_id = Some(id);
    }

    /// Removes the instance entry, returning it.
    pub fn take_instance_id(&mut self) -> Option<InstanceId> {
        self.instance_id.take()
    }

    /// Returns the created disk, if any.
    #[must_use]
    pub fn disk_id(&self) -> Option<DiskId> {
        self.disk_id
    }

    /// Returns the created disk or a missing-state error.
    pub fn require_disk_id(&self) -> Result<DiskId, ImageflowError> {
        self.disk_id.ok_or(ImageflowError::MissingState(keys::DISK_ID))
    }

    /// Records the created disk.
    pub fn set_disk_id(&mut self, id: DiskId) {
        self.disk_id = Some(id);
    }

    /// Removes the disk entry, returning it.
    pub fn take_disk_id(&mut self) -> Option<DiskId> {
        self.disk_id.take()
    }

    /// Returns the created boot configuration, if any.
    #[must_use]
    pub fn boot_config_id(&self) -> Option<BootConfigId> {
        self.boot_config_id
    }

    /// Returns the created boot configuration or a missing-state error.
    pub fn require_boot_config_id(&self) -> Result<BootConfigId, ImageflowError> {
        self.boot_config_id
            .ok_or(ImageflowError::MissingState(keys::BOOT_CONFIG_ID))
    }

    /// Records the created boot configuration.
    pub fn set_boot_config_id(&mut self, id: BootConfigId) {
        self.boot_config_id = Some(id);
    }

    /// Removes the boot configuration entry, returning it.
    pub fn take_boot_config_id(&mut self) -> Option<BootConfigId> {
        self.boot_config_id.take()
    }

    /// Returns the most recent remote job, if any.
    #[must_use]
    pub fn job_id(&self) -> Option<JobId> {
        self.job_id
    }

    /// Records the most recent remote job.
    pub fn set_job_id(&mut self, id: JobId) {
        self.job_id = Some(id);
    }

    /// Returns the discovered address, if any.
    #[must_use]
    pub fn instance_address(&self) -> Option<&str> {
        self.instance_address.as_deref()
    }

    /// Returns the discovered address or a missing-state error.
    pub fn require_instance_address(&self) -> Result<&str, ImageflowError> {
        self.instance_address
            .as_deref()
            .ok_or(ImageflowError::MissingState(keys::INSTANCE_ADDRESS))
    }

    /// Records the discovered address.
    pub fn set_instance_address(&mut self, address: impl Into<String>) {
        self.instance_address = Some(address.into());
    }

    /// Returns the produced image, if any.
    #[must_use]
    pub fn image_id(&self) -> Option<ImageId> {
        self.image_id
    }

    /// Returns the produced image label, if any.
    #[must_use]
    pub fn image_label(&self) -> Option<&str> {
        self.image_label.as_deref()
    }

    /// Records the produced image and its label.
    pub fn set_image(&mut self, id: ImageId, label: impl Into<String>) {
        self.image_id = Some(id);
        self.image_label = Some(label.into());
    }

    /// Returns the halting error, if one was stored.
    #[must_use]
    pub fn error(&self) -> Option<&ImageflowError> {
        self.error.as_ref()
    }

    /// Returns true if a halting error was stored.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Stores the halting error. The first stored error is kept.
    pub fn set_error(&mut self, error: ImageflowError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Removes the halting error, returning it.
    pub fn take_error(&mut self) -> Option<ImageflowError> {
        self.error.take()
    }

    /// Lists the keys currently populated, in pipeline order.
    #[must_use]
    pub fn populated_keys(&self) -> Vec<&'static str> {
        [
            (keys::INSTANCE_ID, self.instance_id.is_some()),
            (keys::DISK_ID, self.disk_id.is_some()),
            (keys::BOOT_CONFIG_ID, self.boot_config_id.is_some()),
            (keys::JOB_ID, self.job_id.is_some()),
            (keys::INSTANCE_ADDRESS, self.instance_address.is_some()),
            (keys::ERROR, self.error.is_some()),
            (keys::IMAGE_ID, self.image_id.is_some()),
            (keys::IMAGE_LABEL, self.image_label.is_some()),
        ]
        .into_iter()
        .filter_map(|(key, present)| present.then_some(key))
        .collect()
    }
}
