//! The image builder entry point.

use super::StepRunner;
use crate::cancellation::{CancellationToken, DEFAULT_CANCEL_REASON};
use crate::client::{ComputeApi, Provisioner};
use crate::config::PipelineConfig;
use crate::context::{RunIdentity, StateBag};
use crate::core::Artifact;
use crate::errors::{ConfigError, ImageflowError};
use crate::events::{LoggingProgressSink, ProgressSink};
use crate::steps::{
    Boot, CreateBootConfig, CreateDisk, CreateInstance, DiscoverAddress, Imagize, Provision, Step,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Builds one image from a validated configuration.
///
/// ```rust,ignore
/// let builder = ImageBuilder::new(config, api, provisioner)?;
/// let token = builder.cancellation_token();
/// let artifact = builder.run().await?;
/// println!("{artifact}");
/// ```
///
/// The cancellation token belongs to the builder: once cancelled, every
/// later run stops before its first step.
pub struct ImageBuilder {
    config: Arc<PipelineConfig>,
    api: Arc<dyn ComputeApi>,
    provisioner: Arc<dyn Provisioner>,
    sink: Arc<dyn ProgressSink>,
    token: Arc<CancellationToken>,
    running: watch::Sender<bool>,
}

/// Clears the running flag when a run ends, however it ends.
struct RunningGuard<'a>(&'a watch::Sender<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl ImageBuilder {
    /// Creates a builder after validating `config`.
    ///
    /// No remote call is made for an invalid configuration.
    pub fn new(
        config: PipelineConfig,
        api: Arc<dyn ComputeApi>,
        provisioner: Arc<dyn Provisioner>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (running, _) = watch::channel(false);
        Ok(Self {
            config: Arc::new(config),
            api,
            provisioner,
            sink: Arc::new(LoggingProgressSink::default()),
            token: Arc::new(CancellationToken::new()),
            running,
        })
    }

    /// Sets the progress sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Shares an externally owned cancellation token.
    #[must_use]
    pub fn with_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.token = token;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the token an external caller (a signal handler, say) can
    /// cancel.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        self.token.clone()
    }

    /// Returns true while a run is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Builds the ordered step list.
    #[must_use]
    pub fn steps(&self) -> Vec<Box<dyn Step>> {
        vec![
            Box::new(CreateInstance::new(self.api.clone())),
            Box::new(CreateDisk::new(self.api.clone())),
            Box::new(CreateBootConfig::new(self.api.clone())),
            Box::new(Boot::new(self.api.clone())),
            Box::new(DiscoverAddress::new(self.api.clone())),
            Box::new(Provision::new(self.provisioner.clone())),
            Box::new(Imagize::new(self.api.clone())),
        ]
    }

    /// Runs the pipeline and produces the artifact.
    ///
    /// Runs on one builder must not overlap; a second concurrent call is
    /// rejected before any remote call is made.
    pub async fn run(&self) -> Result<Artifact, ImageflowError> {
        let started = self.running.send_if_modified(|running| {
            let idle = !*running;
            *running = true;
            idle
        });
        if !started {
            return Err(ConfigError::single("a build is already running on this builder").into());
        }
        let _guard = RunningGuard(&self.running);

        let identity = RunIdentity::new().with_build_name(self.config.image_label.clone());
        info!(
            run_id = %identity.run_id_str(),
            region = %self.config.region,
            image = %self.config.image,
            "Running builder"
        );
        self.sink.say("Running builder ...");

        let runner = StepRunner::new(self.steps())
            .with_sink(self.sink.clone())
            .with_token(self.token.clone());
        let report = runner
            .run(StateBag::with_identity(self.config.clone(), identity))
            .await;

        if !report.teardown_errors.is_empty() {
            warn!(errors = %report.teardown_errors, "Transient resources were not fully released");
        }
        let state = report.into_result()?;
        let artifact = Artifact::from_state(&state)?;
        info!(image_id = %artifact.image_id(), label = %artifact.image_label(), "Build finished");
        Ok(artifact)
    }

    /// Requests cancellation and waits until the in-flight run, including
    /// its compensation, has finished.
    ///
    /// Returns immediately when no run is in flight.
    pub async fn cancel(&self) {
        self.token.cancel(DEFAULT_CANCEL_REASON);
        let mut running = self.running.subscribe();
        // The sender lives in `self`, so the wait cannot fail.
        let _ = running.wait_for(|running| !*running).await;
    }
}

impl std::fmt::Debug for ImageBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBuilder")
            .field("config", &self.config)
            .field("token", &self.token)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
