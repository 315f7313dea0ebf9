//! A scriptable in-memory compute API.

use crate::cancellation::CancellationToken;
use crate::client::{
    BootConfigId, ComputeApi, DiskId, DiskSpec, ImageId, ImagizeSpec, InstanceId, InstanceSpec,
    InstanceStatus, JobId, JobStatus,
};
use crate::errors::RemoteError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// First job id handed out by [`ScriptedComputeApi`].
pub const FIRST_JOB_ID: u64 = 100;

/// Remote operations, used to script failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `create_instance`.
    CreateInstance,
    /// `create_disk`.
    CreateDisk,
    /// `create_boot_config`.
    CreateBootConfig,
    /// `boot`.
    Boot,
    /// `shutdown`.
    Shutdown,
    /// `list_addresses`.
    ListAddresses,
    /// `instance_status`.
    InstanceStatus,
    /// `imagize`.
    Imagize,
    /// `delete_instance`.
    DeleteInstance,
    /// `delete_disk`.
    DeleteDisk,
    /// `delete_boot_config`.
    DeleteBootConfig,
    /// `job_status`.
    JobStatus,
}

/// A recorded call with the arguments tests assert on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    /// Instance creation.
    CreateInstance {
        /// Requested label.
        label: String,
    },
    /// Disk creation.
    CreateDisk {
        /// Owning instance.
        instance_id: InstanceId,
        /// Requested size.
        size_mb: u64,
    },
    /// Boot configuration creation.
    CreateBootConfig {
        /// Owning instance.
        instance_id: InstanceId,
        /// Disk to boot from.
        disk_id: DiskId,
        /// Requested kernel.
        kernel: String,
    },
    /// Boot request.
    Boot {
        /// Target instance.
        instance_id: InstanceId,
        /// Boot configuration.
        config_id: BootConfigId,
    },
    /// Shutdown request.
    Shutdown {
        /// Target instance.
        instance_id: InstanceId,
    },
    /// Address listing.
    ListAddresses {
        /// Target instance.
        instance_id: InstanceId,
    },
    /// Status query.
    InstanceStatus {
        /// Target instance.
        instance_id: InstanceId,
    },
    /// Image creation.
    Imagize {
        /// Owning instance.
        instance_id: InstanceId,
        /// Source disk.
        disk_id: DiskId,
        /// Requested label.
        label: String,
    },
    /// Instance deletion.
    DeleteInstance {
        /// Target instance.
        instance_id: InstanceId,
    },
    /// Disk deletion.
    DeleteDisk {
        /// Owning instance.
        instance_id: InstanceId,
        /// Target disk.
        disk_id: DiskId,
    },
    /// Boot configuration deletion.
    DeleteBootConfig {
        /// Owning instance.
        instance_id: InstanceId,
        /// Target configuration.
        config_id: BootConfigId,
    },
    /// Job status query.
    JobStatus {
        /// Owning instance.
        instance_id: InstanceId,
        /// Polled job.
        job_id: JobId,
    },
}

impl ApiCall {
    /// Returns the operation this call belongs to.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::CreateInstance { .. } => Operation::CreateInstance,
            Self::CreateDisk { .. } => Operation::CreateDisk,
            Self::CreateBootConfig { .. } => Operation::CreateBootConfig,
            Self::Boot { .. } => Operation::Boot,
            Self::Shutdown { .. } => Operation::Shutdown,
            Self::ListAddresses { .. } => Operation::ListAddresses,
            Self::InstanceStatus { .. } => Operation::InstanceStatus,
            Self::Imagize { .. } => Operation::Imagize,
            Self::DeleteInstance { .. } => Operation::DeleteInstance,
            Self::DeleteDisk { .. } => Operation::DeleteDisk,
            Self::DeleteBootConfig { .. } => Operation::DeleteBootConfig,
            Self::JobStatus { .. } => Operation::JobStatus,
        }
    }
}

#[derive(Debug)]
struct Script {
    instance_id: InstanceId,
    disk_id: DiskId,
    boot_config_id: BootConfigId,
    image_id: ImageId,
    addresses: Vec<String>,
    failures: HashMap<Operation, RemoteError>,
    job_failures: HashMap<Operation, String>,
    job_id_failures: HashMap<JobId, String>,
    pending_polls: u32,
    statuses: VecDeque<InstanceStatus>,
    cancel_on_status_poll: Option<(usize, Arc<CancellationToken>)>,
    next_job_id: u64,
    jobs: HashMap<JobId, Operation>,
    job_polls: HashMap<JobId, u32>,
    calls: Vec<ApiCall>,
}

/// In-memory [`ComputeApi`] driven by a script.
///
/// Every call is recorded. By default every call succeeds, jobs finish on
/// their first poll and the instance reports running; the default ids are
/// instance 7, disk 3, boot config 9, image 99 and address `10.0.0.5`.
#[derive(Debug)]
pub struct ScriptedComputeApi {
    script: Mutex<Script>,
}

impl Default for ScriptedComputeApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedComputeApi {
    /// Creates an API where everything succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                instance_id: InstanceId(7),
                disk_id: DiskId(3),
                boot_config_id: BootConfigId(9),
                image_id: ImageId(99),
                addresses: vec!["10.0.0.5".to_string()],
                failures: HashMap::new(),
                job_failures: HashMap::new(),
                job_id_failures: HashMap::new(),
                pending_polls: 0,
                statuses: VecDeque::from([InstanceStatus::Running]),
                cancel_on_status_poll: None,
                next_job_id: FIRST_JOB_ID,
                jobs: HashMap::new(),
                job_polls: HashMap::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// Sets the id returned by `create_instance`.
    #[must_use]
    pub fn with_instance_id(self, id: InstanceId) -> Self {
        self.script.lock().instance_id = id;
        self
    }

    /// Sets the id returned by `create_disk`.
    #[must_use]
    pub fn with_disk_id(self, id: DiskId) -> Self {
        self.script.lock().disk_id = id;
        self
    }

    /// Sets the id returned by `create_boot_config`.
    #[must_use]
    pub fn with_boot_config_id(self, id: BootConfigId) -> Self {
        self.script.lock().boot_config_id = id;
        self
    }

    /// Sets the id returned by `imagize`.
    #[must_use]
    pub fn with_image_id(self, id: ImageId) -> Self {
        self.script.lock().image_id = id;
        self
    }

    /// Sets the addresses returned by `list_addresses`.
    #[must_use]
    pub fn with_addresses<I, S>(self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script.lock().addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    /// Makes every call of `operation` fail with `error`.
    #[must_use]
    pub fn fail(self, operation: Operation, error: RemoteError) -> Self {
        self.script.lock().failures.insert(operation, error);
        self
    }

    /// Makes jobs started by `operation` finish with a failure `message`.
    #[must_use]
    pub fn fail_job(self, operation: Operation, message: impl Into<String>) -> Self {
        self.script.lock().job_failures.insert(operation, message.into());
        self
    }

    /// Makes the job `job_id` finish with a failure `message`.
    #[must_use]
    pub fn fail_job_id(self, job_id: JobId, message: impl Into<String>) -> Self {
        self.script.lock().job_id_failures.insert(job_id, message.into());
        self
    }

    /// Reports every job as pending for its first `polls` status queries.
    #[must_use]
    pub fn job_pending_polls(self, polls: u32) -> Self {
        self.script.lock().pending_polls = polls;
        self
    }

    /// Scripts the instance statuses reported, in order; the last one repeats.
    #[must_use]
    pub fn instance_statuses(self, statuses: impl IntoIterator<Item = InstanceStatus>) -> Self {
        self.script.lock().statuses = statuses.into_iter().collect();
        self
    }

    /// Cancels `token` while answering the `poll`-th status query.
    #[must_use]
    pub fn cancel_on_status_poll(self, poll: usize, token: Arc<CancellationToken>) -> Self {
        self.script.lock().cancel_on_status_poll = Some((poll, token));
        self
    }

    /// Returns every recorded call, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.script.lock().calls.clone()
    }

    /// Returns the operation of every recorded call, in order.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.script.lock().calls.iter().map(ApiCall::operation).collect()
    }

    /// Returns the operations other than status and job polls, in order.
    #[must_use]
    pub fn mutations(&self) -> Vec<Operation> {
        self.operations()
            .into_iter()
            .filter(|op| !matches!(op, Operation::JobStatus | Operation::InstanceStatus))
            .collect()
    }

    /// Returns how often `operation` was called.
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    fn record(&self, call: ApiCall) -> Result<(), RemoteError> {
        let mut script = self.script.lock();
        let operation = call.operation();
        script.calls.push(call);
        match script.failures.get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn start_job(&self, operation: Operation) -> JobId {
        let mut script = self.script.lock();
        let job_id = JobId(script.next_job_id);
        script.next_job_id += 1;
        script.jobs.insert(job_id, operation);
        job_id
    }
}

#[async_trait]
impl ComputeApi for ScriptedComputeApi {
    async fn create_instance(
        &self,
        spec: &InstanceSpec,
        _token: &CancellationToken,
    ) -> Result<InstanceId, RemoteError> {
        self.record(ApiCall::CreateInstance {
            label: spec.label.clone(),
        })?;
        Ok(self.script.lock().instance_id)
    }

    async fn create_disk(
        &self,
        spec: &DiskSpec,
        _token: &CancellationToken,
    ) -> Result<(DiskId, JobId), RemoteError> {
        self.record(ApiCall::CreateDisk {
            instance_id: spec.instance_id,
            size_mb: spec.size_mb,
        })?;
        let disk_id = self.script.lock().disk_id;
        Ok((disk_id, self.start_job(Operation::CreateDisk)))
    }

    async fn create_boot_config(
        &self,
        instance_id: InstanceId,
        disk_id: DiskId,
        kernel: &str,
        _label: &str,
        _token: &CancellationToken,
    ) -> Result<BootConfigId, RemoteError> {
        self.record(ApiCall::CreateBootConfig {
            instance_id,
            disk_id,
            kernel: kernel.to_string(),
        })?;
        Ok(self.script.lock().boot_config_id)
    }

    async fn boot(
        &self,
        instance_id: InstanceId,
        config_id: BootConfigId,
        _token: &CancellationToken,
    ) -> Result<JobId, RemoteError> {
        self.record(ApiCall::Boot {
            instance_id,
            config_id,
        })?;
        Ok(self.start_job(Operation::Boot))
    }

    async fn shutdown(
        &self,
        instance_id: InstanceId,
        _token: &CancellationToken,
    ) -> Result<JobId, RemoteError> {
        self.record(ApiCall::Shutdown { instance_id })?;
        Ok(self.start_job(Operation::Shutdown))
    }

    async fn list_addresses(
        &self,
        instance_id: InstanceId,
        _token: &CancellationToken,
    ) -> Result<Vec<String>, RemoteError> {
        self.record(ApiCall::ListAddresses { instance_id })?;
        Ok(self.script.lock().addresses.clone())
    }

    async fn instance_status(
        &self,
        instance_id: InstanceId,
        _token: &CancellationToken,
    ) -> Result<InstanceStatus, RemoteError> {
        self.record(ApiCall::InstanceStatus { instance_id })?;

        let polls = self.count(Operation::InstanceStatus);
        let mut script = self.script.lock();
        if let Some((at, token)) = &script.cancel_on_status_poll {
            if polls == *at {
                token.cancel("interrupted");
            }
        }
        let status = if script.statuses.len() > 1 {
            script.statuses.pop_front()
        } else {
            script.statuses.front().cloned()
        };
        Ok(status.unwrap_or(InstanceStatus::Running))
    }

    async fn imagize(
        &self,
        spec: &ImagizeSpec,
        _token: &CancellationToken,
    ) -> Result<(ImageId, JobId), RemoteError> {
        self.record(ApiCall::Imagize {
            instance_id: spec.instance_id,
            disk_id: spec.disk_id,
            label: spec.label.clone(),
        })?;
        let image_id = self.script.lock().image_id;
        Ok((image_id, self.start_job(Operation::Imagize)))
    }

    async fn delete_instance(
        &self,
        instance_id: InstanceId,
        _token: &CancellationToken,
    ) -> Result<(), RemoteError> {
        self.record(ApiCall::DeleteInstance { instance_id })
    }

    async fn delete_disk(
        &self,
        instance_id: InstanceId,
        disk_id: DiskId,
        _token: &CancellationToken,
    ) -> Result<JobId, RemoteError> {
        self.record(ApiCall::DeleteDisk {
            instance_id,
            disk_id,
        })?;
        Ok(self.start_job(Operation::DeleteDisk))
    }

    async fn delete_boot_config(
        &self,
        instance_id: InstanceId,
        config_id: BootConfigId,
        _token: &CancellationToken,
    ) -> Result<(), RemoteError> {
        self.record(ApiCall::DeleteBootConfig {
            instance_id,
            config_id,
        })
    }

    async fn job_status(
        &self,
        instance_id: InstanceId,
        job_id: JobId,
        _token: &CancellationToken,
    ) -> Result<JobStatus, RemoteError> {
        self.record(ApiCall::JobStatus {
            instance_id,
            job_id,
        })?;

        let mut script = self.script.lock();
        let pending = script.pending_polls;
        let polls = script.job_polls.entry(job_id).or_insert(0);
        *polls += 1;
        if *polls <= pending {
            return Ok(JobStatus::pending());
        }

        let failure = script.job_id_failures.get(&job_id).cloned().or_else(|| {
            script
                .jobs
                .get(&job_id)
                .and_then(|operation| script.job_failures.get(operation).cloned())
        });
        Ok(failure.map_or_else(JobStatus::succeeded, |message| JobStatus::failed(message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_jobs_are_numbered_and_scripted() {
        let api = ScriptedComputeApi::new().fail_job(Operation::Boot, "boot failed");
        let token = CancellationToken::new();

        let boot_job = api.boot(InstanceId(7), BootConfigId(9), &token).await.unwrap();
        let shutdown_job = api.shutdown(InstanceId(7), &token).await.unwrap();

        assert_eq!(boot_job, JobId(100));
        assert_eq!(shutdown_job, JobId(101));
        assert_eq!(
            api.job_status(InstanceId(7), boot_job, &token).await.unwrap(),
            JobStatus::failed("boot failed")
        );
        assert_eq!(
            api.job_status(InstanceId(7), shutdown_job, &token).await.unwrap(),
            JobStatus::succeeded()
        );
        assert_eq!(api.mutations(), vec![Operation::Boot, Operation::Shutdown]);
    }

    #[tokio::test]
    async fn test_statuses_advance_and_last_repeats() {
        let api = ScriptedComputeApi::new()
            .instance_statuses([InstanceStatus::Booting, InstanceStatus::Running]);
        let token = CancellationToken::new();

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(api.instance_status(InstanceId(7), &token).await.unwrap());
        }

        assert_eq!(
            seen,
            vec![InstanceStatus::Booting, InstanceStatus::Running, InstanceStatus::Running]
        );
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_returned() {
        let api = ScriptedComputeApi::new()
            .fail(Operation::DeleteInstance, RemoteError::transport("reset"));

        let err = api
            .delete_instance(InstanceId(7), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "reset");
        assert_eq!(api.count(Operation::DeleteInstance), 1);
    }
}
