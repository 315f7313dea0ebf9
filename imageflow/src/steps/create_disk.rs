//! Creates the disk from the source image.

use super::{cleanup_failed, halt, Step, StepContext};
use crate::client::{ComputeApi, DiskId, DiskSpec, InstanceId, RemoteJob};
use crate::context::StateBag;
use crate::core::StepOutcome;
use crate::errors::ImageflowError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Creates the disk, records `disk-id` and waits for the disk job.
pub struct CreateDisk {
    api: Arc<dyn ComputeApi>,
}

impl CreateDisk {
    /// Creates the step.
    #[must_use]
    pub fn new(api: Arc<dyn ComputeApi>) -> Self {
        Self { api }
    }

    async fn create(&self, state: &mut StateBag, ctx: &StepContext) -> Result<(), ImageflowError> {
        let instance_id = state.require_instance_id()?;
        let config = state.config();
        let spec = DiskSpec {
            instance_id,
            image: config.image.clone(),
            label: config.label.clone(),
            size_mb: config.disk_size,
            root_pass: config.root_pass.clone(),
            root_ssh_key: config.root_ssh_key.clone(),
        };

        let (disk_id, job_id) = self.api.create_disk(&spec, ctx.token()).await?;
        state.set_disk_id(disk_id);
        state.set_job_id(job_id);

        ctx.poller(&self.api, state)
            .await_success(RemoteJob::new(instance_id, job_id), ctx.token())
            .await?;
        info!(
            instance_id = %instance_id,
            disk_id = %disk_id,
            size_mb = spec.size_mb,
            "Disk created"
        );
        Ok(())
    }

    async fn delete(
        &self,
        instance_id: InstanceId,
        disk_id: DiskId,
        state: &StateBag,
        ctx: &StepContext,
    ) -> Result<(), ImageflowError> {
        let result = async {
            let job_id = self.api.delete_disk(instance_id, disk_id, ctx.token()).await?;
            ctx.poller(&self.api, state)
                .await_success(RemoteJob::new(instance_id, job_id), ctx.token())
                .await
        }
        .await;

        result.map_err(|e| cleanup_failed(ctx, "Error cleaning up disk", e))?;
        info!(instance_id = %instance_id, disk_id = %disk_id, "Disk deleted");
        Ok(())
    }
}

#[async_trait]
impl Step for CreateDisk {
    fn name(&self) -> &str {
        "create_disk"
    }

    async fn run(&self, state: &mut StateBag, ctx: &StepContext) -> StepOutcome {
        ctx.sink().say("Creating disk...");

        match self.create(state, ctx).await {
            Ok(()) => StepOutcome::Continue,
            Err(e) => halt(state, ctx, "Error creating disk", e),
        }
    }

    async fn compensate(
        &self,
        state: &mut StateBag,
        ctx: &StepContext,
    ) -> Result<(), ImageflowError> {
        let (Some(disk_id), Some(instance_id)) = (state.take_disk_id(), state.instance_id()) else {
            return Ok(());
        };
        self.delete(instance_id, disk_id, state, ctx).await
    }

    async fn teardown(&self, state: &StateBag, ctx: &StepContext) -> Result<(), ImageflowError> {
        let (Some(disk_id), Some(instance_id)) = (state.disk_id(), state.instance_id()) else {
            return Ok(());
        };
        self.delete(instance_id, disk_id, state, ctx).await
    }
}
