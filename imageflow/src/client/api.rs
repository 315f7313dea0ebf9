//! The remote compute API seam.

use super::types::{
    BootConfigId, DiskId, DiskSpec, ImageId, ImagizeSpec, InstanceId, InstanceSpec,
    InstanceStatus, JobId, JobStatus,
};
use crate::cancellation::CancellationToken;
use crate::errors::RemoteError;
use async_trait::async_trait;

/// Client for the remote compute API.
///
/// Every call is a single request: implementations must not retry on
/// their own. Long-running operations return a [`JobId`] that callers poll
/// through [`ComputeApi::job_status`]. Each call receives the run's
/// cancellation token so transports can abort in-flight requests.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Creates a compute instance.
    async fn create_instance(
        &self,
        spec: &InstanceSpec,
        token: &CancellationToken,
    ) -> Result<InstanceId, RemoteError>;

    /// Creates a disk from an image; returns the disk and its provisioning job.
    async fn create_disk(
        &self,
        spec: &DiskSpec,
        token: &CancellationToken,
    ) -> Result<(DiskId, JobId), RemoteError>;

    /// Associates a disk and kernel into a bootable configuration.
    async fn create_boot_config(
        &self,
        instance_id: InstanceId,
        disk_id: DiskId,
        kernel: &str,
        label: &str,
        token: &CancellationToken,
    ) -> Result<BootConfigId, RemoteError>;

    /// Boots an instance with the given configuration.
    async fn boot(
        &self,
        instance_id: InstanceId,
        config_id: BootConfigId,
        token: &CancellationToken,
    ) -> Result<JobId, RemoteError>;

    /// Shuts an instance down.
    async fn shutdown(
        &self,
        instance_id: InstanceId,
        token: &CancellationToken,
    ) -> Result<JobId, RemoteError>;

    /// Lists the network addresses of an instance.
    async fn list_addresses(
        &self,
        instance_id: InstanceId,
        token: &CancellationToken,
    ) -> Result<Vec<String>, RemoteError>;

    /// Reports the current status of an instance.
    async fn instance_status(
        &self,
        instance_id: InstanceId,
        token: &CancellationToken,
    ) -> Result<InstanceStatus, RemoteError>;

    /// Converts a disk into an image; returns the image and its job.
    async fn imagize(
        &self,
        spec: &ImagizeSpec,
        token: &CancellationToken,
    ) -> Result<(ImageId, JobId), RemoteError>;

    /// Deletes an instance.
    async fn delete_instance(
        &self,
        instance_id: InstanceId,
        token: &CancellationToken,
    ) -> Result<(), RemoteError>;

    /// Deletes a disk; the deletion itself is an asynchronous job.
    async fn delete_disk(
        &self,
        instance_id: InstanceId,
        disk_id: DiskId,
        token: &CancellationToken,
    ) -> Result<JobId, RemoteError>;

    /// Deletes a boot configuration.
    async fn delete_boot_config(
        &self,
        instance_id: InstanceId,
        config_id: BootConfigId,
        token: &CancellationToken,
    ) -> Result<(), RemoteError>;

    /// Reports the progress of a job.
    async fn job_status(
        &self,
        instance_id: InstanceId,
        job_id: JobId,
        token: &CancellationToken,
    ) -> Result<JobStatus, RemoteError>;
}
