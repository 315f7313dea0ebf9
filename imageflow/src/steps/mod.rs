//! Pipeline steps.
//!
//! A step is the unit of pipeline work. It has a run action that reports a
//! [`StepOutcome`], a compensating action the runner invokes when a later
//! step stops the pipeline, and a teardown action for transient resources
//! once the whole pipeline has succeeded.
//!
//! The image pipeline is, in order: [`CreateInstance`], [`CreateDisk`],
//! [`CreateBootConfig`], [`Boot`], [`DiscoverAddress`], [`Provision`] and
//! [`Imagize`].

mod boot;
mod create_boot_config;
mod create_disk;
mod create_instance;
mod discover_address;
mod imagize;
mod provision;

pub use boot::Boot;
pub use create_boot_config::CreateBootConfig;
pub use create_disk::CreateDisk;
pub use create_instance::CreateInstance;
pub use discover_address::DiscoverAddress;
pub use imagize::Imagize;
pub use provision::Provision;

use crate::cancellation::CancellationToken;
use crate::client::ComputeApi;
use crate::context::StateBag;
use crate::core::StepOutcome;
use crate::errors::ImageflowError;
use crate::events::ProgressSink;
use crate::jobs::{JobPoller, PollSettings};
use async_trait::async_trait;
use std::sync::Arc;

/// Collaborators a step sees while it runs.
#[derive(Clone)]
pub struct StepContext {
    sink: Arc<dyn ProgressSink>,
    token: Arc<CancellationToken>,
}

impl StepContext {
    /// Creates a context reporting to `sink` and observing `token`.
    #[must_use]
    pub fn new(sink: Arc<dyn ProgressSink>, token: Arc<CancellationToken>) -> Self {
        Self { sink, token }
    }

    /// Returns the progress sink.
    #[must_use]
    pub fn sink(&self) -> &dyn ProgressSink {
        self.sink.as_ref()
    }

    /// Returns the run's cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns a context with a fresh token, for cleanup that must finish
    /// even though the run was cancelled.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self {
            sink: self.sink.clone(),
            token: Arc::new(CancellationToken::new()),
        }
    }

    /// Builds a job poller reporting to this context's sink.
    #[must_use]
    pub fn poller(&self, api: &Arc<dyn ComputeApi>, state: &StateBag) -> JobPoller {
        JobPoller::new(api.clone(), PollSettings::from_config(state.config()))
            .with_sink(self.sink.clone())
    }
}

impl std::fmt::Debug for StepContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepContext")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// A unit of pipeline work.
#[async_trait]
pub trait Step: Send + Sync {
    /// Returns the step name.
    fn name(&self) -> &str;

    /// Runs the step.
    ///
    /// A step that cannot proceed stores its error in the bag and returns
    /// [`StepOutcome::Halt`] (or [`StepOutcome::Cancelled`]).
    async fn run(&self, state: &mut StateBag, ctx: &StepContext) -> StepOutcome;

    /// Undoes the effects of a completed run after a later step stopped the
    /// pipeline.
    ///
    /// Must be a no-op when the resource it owns is absent from the bag.
    async fn compensate(
        &self,
        _state: &mut StateBag,
        _ctx: &StepContext,
    ) -> Result<(), ImageflowError> {
        Ok(())
    }

    /// Releases transient resources after the whole pipeline succeeded.
    async fn teardown(&self, _state: &StateBag, _ctx: &StepContext) -> Result<(), ImageflowError> {
        Ok(())
    }
}

/// Stores a halting error and reports it.
///
/// Cancellation is stored as is; other errors are prefixed with `context`.
pub(crate) fn halt(
    state: &mut StateBag,
    ctx: &StepContext,
    context: &str,
    error: ImageflowError,
) -> StepOutcome {
    if error.is_cancellation() {
        state.set_error(error);
        return StepOutcome::Cancelled;
    }

    let error = error.in_step(context);
    ctx.sink().error(&error.to_string());
    state.set_error(error);
    StepOutcome::Halt
}

/// Prefixes a cleanup failure with `context` and reports it.
pub(crate) fn cleanup_failed(
    ctx: &StepContext,
    context: &str,
    error: ImageflowError,
) -> ImageflowError {
    let error = error.in_step(context);
    ctx.sink().error(&error.to_string());
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::errors::ErrorKind;
    use crate::events::CollectingProgressSink;
    use pretty_assertions::assert_eq;

    fn fixture() -> (StateBag, StepContext, Arc<CollectingProgressSink>) {
        let sink = Arc::new(CollectingProgressSink::new());
        let ctx = StepContext::new(sink.clone(), Arc::new(CancellationToken::new()));
        (StateBag::new(Arc::new(PipelineConfig::default())), ctx, sink)
    }

    #[test]
    fn test_halt_prefixes_and_reports() {
        let (mut state, ctx, sink) = fixture();

        let outcome = halt(
            &mut state,
            &ctx,
            "Error creating disk",
            ImageflowError::job_failed(5, "disk too large"),
        );

        assert_eq!(outcome, StepOutcome::Halt);
        assert_eq!(sink.errors(), vec!["Error creating disk: disk too large"]);
        let err = state.error().unwrap();
        assert_eq!(err.root().to_string(), "disk too large");
        assert_eq!(err.kind(), ErrorKind::RemoteJob);
    }

    #[test]
    fn test_halt_on_cancellation() {
        let (mut state, ctx, sink) = fixture();

        let stop = ImageflowError::cancelled("stop");
        let outcome = halt(&mut state, &ctx, "Error booting instance", stop);

        assert_eq!(outcome, StepOutcome::Cancelled);
        assert!(sink.is_empty());
        assert_eq!(state.error().unwrap().to_string(), "stop");
    }

    #[test]
    fn test_detached_context_has_fresh_token() {
        let (_, ctx, _) = fixture();
        ctx.token().cancel("stop");

        assert!(!ctx.detached().token().is_cancelled());
    }
}
