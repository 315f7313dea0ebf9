//! Creates the compute instance the image is built on.

use super::{cleanup_failed, halt, Step, StepContext};
use crate::client::{ComputeApi, InstanceId, InstanceSpec};
use crate::context::StateBag;
use crate::core::StepOutcome;
use crate::errors::ImageflowError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Creates the instance and records `instance-id`.
pub struct CreateInstance {
    api: Arc<dyn ComputeApi>,
}

impl CreateInstance {
    /// Creates the step.
    #[must_use]
    pub fn new(api: Arc<dyn ComputeApi>) -> Self {
        Self { api }
    }

    async fn delete(
        &self,
        instance_id: InstanceId,
        ctx: &StepContext,
    ) -> Result<(), ImageflowError> {
        self.api
            .delete_instance(instance_id, ctx.token())
            .await
            .map_err(|e| cleanup_failed(ctx, "Error cleaning up instance", e.into()))?;
        info!(instance_id = %instance_id, "Instance deleted");
        Ok(())
    }
}

#[async_trait]
impl Step for CreateInstance {
    fn name(&self) -> &str {
        "create_instance"
    }

    async fn run(&self, state: &mut StateBag, ctx: &StepContext) -> StepOutcome {
        ctx.sink().say("Creating instance...");

        let config = state.config();
        let spec = InstanceSpec {
            region: config.region.clone(),
            instance_type: config.instance_type.clone(),
            label: config.label.clone(),
            tags: config.tags.clone(),
            billing_term: config.billing_term,
        };

        match self.api.create_instance(&spec, ctx.token()).await {
            Ok(instance_id) => {
                info!(instance_id = %instance_id, region = %spec.region, "Instance created");
                state.set_instance_id(instance_id);
                StepOutcome::Continue
            }
            Err(e) => halt(state, ctx, "Error creating instance", e.into()),
        }
    }

    async fn compensate(
        &self,
        state: &mut StateBag,
        ctx: &StepContext,
    ) -> Result<(), ImageflowError> {
        match state.take_instance_id() {
            Some(instance_id) => self.delete(instance_id, ctx).await,
            None => Ok(()),
        }
    }

    async fn teardown(&self, state: &StateBag, ctx: &StepContext) -> Result<(), ImageflowError> {
        match state.instance_id() {
            Some(instance_id) => self.delete(instance_id, ctx).await,
            None => Ok(()),
        }
    }
}
