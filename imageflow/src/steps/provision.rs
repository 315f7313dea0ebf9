//! Connects to the booted instance and runs the provisioner.

use super::{halt, Step, StepContext};
use crate::client::{ConnectTarget, Provisioner};
use crate::context::StateBag;
use crate::core::StepOutcome;
use crate::errors::ImageflowError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Establishes a connection with bounded retries, then delegates to the
/// provisioning collaborator.
pub struct Provision {
    provisioner: Arc<dyn Provisioner>,
}

impl Provision {
    /// Creates the step.
    #[must_use]
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self { provisioner }
    }

    /// Dials fresh connections until one succeeds or attempts run out.
    async fn connect(
        &self,
        target: &ConnectTarget,
        state: &StateBag,
        ctx: &StepContext,
    ) -> Result<(), ImageflowError> {
        let config = state.config();
        let attempts = config.connect_attempts.max(1);
        let mut attempt = 1;

        loop {
            ctx.token().check()?;
            let dialed = tokio::select! {
                biased;
                () = ctx.token().cancelled() => return Err(ctx.token().error()),
                result = self.provisioner.connect(target) => result,
            };
            let error = match dialed {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            warn!(
                endpoint = %target.endpoint(),
                attempt,
                error = %error,
                "Connection attempt failed"
            );

            if attempt >= attempts {
                return Err(ImageflowError::Provision(format!(
                    "Error establishing connection: {error}"
                )));
            }
            ctx.token().sleep(config.connect_retry_interval()).await?;
            attempt += 1;
            ctx.sink().message(&format!("Attempt #{attempt}"));
        }
    }
}

#[async_trait]
impl Step for Provision {
    fn name(&self) -> &str {
        "provision"
    }

    async fn run(&self, state: &mut StateBag, ctx: &StepContext) -> StepOutcome {
        let address = match state.require_instance_address().map(str::to_string) {
            Ok(address) => address,
            Err(e) => return halt(state, ctx, "Error establishing connection", e),
        };
        let target = ConnectTarget::new(address, state.config().root_pass.clone());

        ctx.sink().say(&format!("Establishing connection @ {}...", target.address));
        if let Err(e) = self.connect(&target, state, ctx).await {
            if e.is_cancellation() {
                return halt(state, ctx, "Error establishing connection", e);
            }
            ctx.sink().error(&e.to_string());
            state.set_error(e);
            return StepOutcome::Halt;
        }
        ctx.sink().message("Connection established!");

        ctx.sink().say("Provisioning...");
        let provisioned = tokio::select! {
            biased;
            () = ctx.token().cancelled() => Err(ctx.token().error()),
            result = self.provisioner.provision(&target) => {
                result.map_err(|e| ImageflowError::Provision(format!("{e:#}")))
            }
        };

        match provisioned {
            Ok(()) => {
                info!(endpoint = %target.endpoint(), "Provisioning finished");
                StepOutcome::Continue
            }
            Err(e) => halt(state, ctx, "Error provisioning", e),
        }
    }
}
