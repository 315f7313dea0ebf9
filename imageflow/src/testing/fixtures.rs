//! Test fixtures for step and pipeline tests.

use std::sync::Arc;

use super::ScriptedComputeApi;
use crate::cancellation::CancellationToken;
use crate::client::ComputeApi;
use crate::config::PipelineConfig;
use crate::context::StateBag;
use crate::events::CollectingProgressSink;
use crate::steps::StepContext;

/// A complete configuration that needs no environment.
#[must_use]
pub fn test_config() -> PipelineConfig {
    PipelineConfig::new("us-east", "g6-standard-1", "linode/debian12")
        .with_token("test-token")
        .with_root_pass("hunter2")
        .with_label("imageflow-test")
        .with_image_label("golden")
}

/// Everything a single step needs, wired to a scripted API.
pub struct StepHarness {
    /// The scripted remote API.
    pub remote: Arc<ScriptedComputeApi>,
    /// Collected progress lines.
    pub sink: Arc<CollectingProgressSink>,
    /// The step context handed to the step.
    pub ctx: StepContext,
    /// The state bag handed to the step.
    pub state: StateBag,
}

impl StepHarness {
    /// Creates a harness over `api` using [`test_config`].
    #[must_use]
    pub fn new(api: ScriptedComputeApi) -> Self {
        Self::with_config(api, test_config())
    }

    /// Creates a harness over `api` using `config`.
    #[must_use]
    pub fn with_config(api: ScriptedComputeApi, config: PipelineConfig) -> Self {
        let sink = Arc::new(CollectingProgressSink::new());
        Self {
            remote: Arc::new(api),
            ctx: StepContext::new(sink.clone(), Arc::new(CancellationToken::new())),
            sink,
            state: StateBag::new(Arc::new(config)),
        }
    }

    /// Replaces the context token.
    #[must_use]
    pub fn with_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.ctx = StepContext::new(self.sink.clone(), token);
        self
    }

    /// Returns the scripted API as a trait object.
    #[must_use]
    pub fn api(&self) -> Arc<dyn ComputeApi> {
        self.remote.clone()
    }
}
