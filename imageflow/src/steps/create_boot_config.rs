//! Creates the boot configuration tying the disk to a kernel.

use super::{cleanup_failed, halt, Step, StepContext};
use crate::client::{BootConfigId, ComputeApi, InstanceId};
use crate::context::StateBag;
use crate::core::StepOutcome;
use crate::errors::ImageflowError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Creates the boot configuration and records `boot-config-id`.
pub struct CreateBootConfig {
    api: Arc<dyn ComputeApi>,
}

impl CreateBootConfig {
    /// Creates the step.
    #[must_use]
    pub fn new(api: Arc<dyn ComputeApi>) -> Self {
        Self { api }
    }

    async fn create(&self, state: &mut StateBag, ctx: &StepContext) -> Result<(), ImageflowError> {
        let instance_id = state.require_instance_id()?;
        let disk_id = state.require_disk_id()?;
        let config = state.config();

        let config_id = self
            .api
            .create_boot_config(instance_id, disk_id, &config.kernel, &config.label, ctx.token())
            .await?;
        info!(
            instance_id = %instance_id,
            config_id = %config_id,
            kernel = %config.kernel,
            "Boot config created"
        );
        state.set_boot_config_id(config_id);
        Ok(())
    }

    async fn delete(
        &self,
        instance_id: InstanceId,
        config_id: BootConfigId,
        ctx: &StepContext,
    ) -> Result<(), ImageflowError> {
        self.api
            .delete_boot_config(instance_id, config_id, ctx.token())
            .await
            .map_err(|e| cleanup_failed(ctx, "Error cleaning up boot config", e.into()))
    }
}

#[async_trait]
impl Step for CreateBootConfig {
    fn name(&self) -> &str {
        "create_boot_config"
    }

    async fn run(&self, state: &mut StateBag, ctx: &StepContext) -> StepOutcome {
        ctx.sink().say("Creating boot config...");

        match self.create(state, ctx).await {
            Ok(()) => StepOutcome::Continue,
            Err(e) => halt(state, ctx, "Error creating boot config", e),
        }
    }

    async fn compensate(
        &self,
        state: &mut StateBag,
        ctx: &StepContext,
    ) -> Result<(), ImageflowError> {
        let (Some(config_id), Some(instance_id)) =
            (state.take_boot_config_id(), state.instance_id())
        else {
            return Ok(());
        };
        self.delete(instance_id, config_id, ctx).await
    }

    async fn teardown(&self, state: &StateBag, ctx: &StepContext) -> Result<(), ImageflowError> {
        let (Some(config_id), Some(instance_id)) = (state.boot_config_id(), state.instance_id())
        else {
            return Ok(());
        };
        self.delete(instance_id, config_id, ctx).await
    }
}
