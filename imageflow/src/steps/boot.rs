//! Boots the instance and waits until it reports running.

use super::{cleanup_failed, halt, Step, StepContext};
use crate::client::{ComputeApi, InstanceId, RemoteJob};
use crate::context::StateBag;
use crate::core::StepOutcome;
use crate::errors::ImageflowError;
use crate::jobs::{poll_until, PollSettings};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Boots the instance with the recorded boot configuration.
///
/// Once the boot request has been accepted the instance counts as booted:
/// a failure or cancellation after that point shuts it down again before
/// the step reports it, since the runner never compensates the step that
/// stopped the pipeline.
pub struct Boot {
    api: Arc<dyn ComputeApi>,
    booted: AtomicBool,
}

impl Boot {
    /// Creates the step.
    #[must_use]
    pub fn new(api: Arc<dyn ComputeApi>) -> Self {
        Self {
            api,
            booted: AtomicBool::new(false),
        }
    }

    /// Returns true while the instance is considered booted.
    #[must_use]
    pub fn is_booted(&self) -> bool {
        self.booted.load(Ordering::SeqCst)
    }

    async fn boot(&self, state: &mut StateBag, ctx: &StepContext) -> Result<(), ImageflowError> {
        let instance_id = state.require_instance_id()?;
        let config_id = state.require_boot_config_id()?;

        let job_id = self.api.boot(instance_id, config_id, ctx.token()).await?;
        self.booted.store(true, Ordering::SeqCst);
        state.set_job_id(job_id);

        ctx.poller(&self.api, state)
            .await_success(RemoteJob::new(instance_id, job_id), ctx.token())
            .await?;

        ctx.sink().say("Waiting for Running status...");
        let api = &self.api;
        let token = ctx.token();
        poll_until(
            &format!("instance {instance_id} to report running"),
            PollSettings::from_config(state.config()),
            token,
            move || async move {
                let status = api.instance_status(instance_id, token).await?;
                Ok(status.is_running().then_some(()))
            },
        )
        .await?;

        info!(instance_id = %instance_id, config_id = %config_id, "Instance running");
        Ok(())
    }

    async fn shutdown(
        &self,
        instance_id: InstanceId,
        state: &StateBag,
        ctx: &StepContext,
    ) -> Result<(), ImageflowError> {
        if !self.booted.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let result = async {
            let job_id = self.api.shutdown(instance_id, ctx.token()).await?;
            ctx.poller(&self.api, state)
                .await_success(RemoteJob::new(instance_id, job_id), ctx.token())
                .await
        }
        .await;

        result.map_err(|e| cleanup_failed(ctx, "Error shutting down instance", e))?;
        info!(instance_id = %instance_id, "Instance shut down");
        Ok(())
    }
}

#[async_trait]
impl Step for Boot {
    fn name(&self) -> &str {
        "boot"
    }

    async fn run(&self, state: &mut StateBag, ctx: &StepContext) -> StepOutcome {
        ctx.sink().say("Booting instance...");

        let Err(error) = self.boot(state, ctx).await else {
            return StepOutcome::Continue;
        };

        if let Some(instance_id) = state.instance_id().filter(|_| self.is_booted()) {
            if let Err(e) = self.shutdown(instance_id, state, &ctx.detached()).await {
                warn!(instance_id = %instance_id, error = %e, "Shutdown after failed boot failed");
            }
        }
        halt(state, ctx, "Error booting instance", error)
    }

    async fn compensate(
        &self,
        state: &mut StateBag,
        ctx: &StepContext,
    ) -> Result<(), ImageflowError> {
        match state.instance_id() {
            Some(instance_id) => self.shutdown(instance_id, state, ctx).await,
            None => Ok(()),
        }
    }

    async fn teardown(&self, state: &StateBag, ctx: &StepContext) -> Result<(), ImageflowError> {
        match state.instance_id() {
            Some(instance_id) => self.shutdown(instance_id, state, ctx).await,
            None => Ok(()),
        }
    }
}
