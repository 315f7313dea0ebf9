//! Looks up the address provisioning connects to.

use super::{halt, Step, StepContext};
use crate::client::ComputeApi;
use crate::context::StateBag;
use crate::core::StepOutcome;
use crate::errors::{ImageflowError, RemoteError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Records the first address of the instance as `instance-address`.
pub struct DiscoverAddress {
    api: Arc<dyn ComputeApi>,
}

impl DiscoverAddress {
    /// Creates the step.
    #[must_use]
    pub fn new(api: Arc<dyn ComputeApi>) -> Self {
        Self { api }
    }

    async fn discover(
        &self,
        state: &StateBag,
        ctx: &StepContext,
    ) -> Result<String, ImageflowError> {
        let instance_id = state.require_instance_id()?;
        let addresses = self.api.list_addresses(instance_id, ctx.token()).await?;
        debug!(instance_id = %instance_id, count = addresses.len(), "Listed addresses");

        addresses.into_iter().next().ok_or_else(|| {
            RemoteError::Parse(format!("no addresses reported for instance {instance_id}")).into()
        })
    }
}

#[async_trait]
impl Step for DiscoverAddress {
    fn name(&self) -> &str {
        "discover_address"
    }

    async fn run(&self, state: &mut StateBag, ctx: &StepContext) -> StepOutcome {
        match self.discover(state, ctx).await {
            Ok(address) => {
                state.set_instance_address(address);
                StepOutcome::Continue
            }
            Err(e) => halt(state, ctx, "Error retrieving instance address", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InstanceId;
    use crate::testing::{ScriptedComputeApi, StepHarness};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_run_stores_first_address() {
        let api = ScriptedComputeApi::new().with_addresses(["10.0.0.5", "2600::1"]);
        let mut h = StepHarness::new(api);
        h.state.set_instance_id(InstanceId(7));
        let step = DiscoverAddress::new(h.api());

        assert_eq!(step.run(&mut h.state, &h.ctx).await, StepOutcome::Continue);
        assert_eq!(h.state.instance_address(), Some("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_run_halts_without_addresses() {
        let api = ScriptedComputeApi::new().with_addresses(Vec::<String>::new());
        let mut h = StepHarness::new(api);
        h.state.set_instance_id(InstanceId(7));
        let step = DiscoverAddress::new(h.api());

        assert_eq!(step.run(&mut h.state, &h.ctx).await, StepOutcome::Halt);
        assert_eq!(
            h.sink.errors(),
            vec![
                "Error retrieving instance address: \
                 Malformed response: no addresses reported for instance 7"
            ]
        );
        assert_eq!(h.state.instance_address(), None);
    }

    #[tokio::test]
    async fn test_compensate_is_noop() {
        let mut h = StepHarness::new(ScriptedComputeApi::new());
        h.state.set_instance_address("10.0.0.5");
        let step = DiscoverAddress::new(h.api());

        step.compensate(&mut h.state, &h.ctx).await.unwrap();

        assert!(h.remote.calls().is_empty());
        assert_eq!(h.state.instance_address(), Some("10.0.0.5"));
    }
}
