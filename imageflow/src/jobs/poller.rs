//! Job poller and the generic cancellable poll loop.

use crate::cancellation::CancellationToken;
use crate::client::{ComputeApi, RemoteJob};
use crate::config::PipelineConfig;
use crate::errors::ImageflowError;
use crate::events::{NoOpProgressSink, ProgressSink};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Interval and deadline applied to a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Pause between two status queries.
    pub interval: Duration,
    /// Upper bound on the whole wait.
    pub deadline: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl PollSettings {
    /// Creates settings from explicit values.
    #[must_use]
    pub const fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    /// Reads the poll interval and state timeout from a configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.poll_interval(), config.state_timeout())
    }
}

/// Terminal state of a remote job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    /// Whether the job succeeded.
    pub success: bool,
    /// Remote-supplied message; meaningful on failure.
    pub message: String,
}

/// Repeatedly runs `probe` until it yields a value.
///
/// `probe` returns `Ok(None)` while the awaited condition does not hold.
/// Errors from `probe` abort the loop immediately. The loop fails with
/// `Timeout` once `settings.deadline` has elapsed and with `Cancelled` as
/// soon as `token` is cancelled, even while a probe is in flight. A deadline
/// too far out to be represented never elapses.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    settings: PollSettings,
    token: &CancellationToken,
    mut probe: F,
) -> Result<T, ImageflowError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ImageflowError>>,
{
    let deadline = Instant::now().checked_add(settings.deadline);
    let mut attempt: u32 = 0;

    loop {
        token.check()?;
        attempt += 1;

        let probed = tokio::select! {
            biased;
            () = token.cancelled() => return Err(token.error()),
            result = probe() => result?,
        };
        if let Some(value) = probed {
            debug!(what, attempt, "Poll condition met");
            return Ok(value);
        }

        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    warn!(what, attempt, "Poll deadline exceeded");
                    return Err(ImageflowError::timeout(what, settings.deadline));
                }
                settings.interval.min(deadline - now)
            }
            None => settings.interval,
        };
        token.sleep(pause).await?;
    }
}

/// Blocks until a remote job reaches a terminal state.
#[derive(Clone)]
pub struct JobPoller {
    api: Arc<dyn ComputeApi>,
    settings: PollSettings,
    sink: Arc<dyn ProgressSink>,
}

impl JobPoller {
    /// Creates a poller over `api`.
    #[must_use]
    pub fn new(api: Arc<dyn ComputeApi>, settings: PollSettings) -> Self {
        Self {
            api,
            settings,
            sink: Arc::new(NoOpProgressSink),
        }
    }

    /// Sets the sink that receives the waiting line.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the poll settings.
    #[must_use]
    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    /// Polls `job` until it finishes, reporting how it finished.
    ///
    /// A failed job is a successful poll: the completion carries the
    /// remote failure message. Transport and parse errors end the wait.
    pub async fn await_job(
        &self,
        job: RemoteJob,
        token: &CancellationToken,
    ) -> Result<JobCompletion, ImageflowError> {
        self.sink
            .message(&format!("--> Waiting for job {} to complete", job.job_id));

        let what = job.to_string();
        let api = &self.api;
        let completion = poll_until(&what, self.settings, token, move || async move {
            let status = api.job_status(job.instance_id, job.job_id, token).await?;
            Ok(status.is_terminal().then(|| JobCompletion {
                success: status.success,
                message: status.message,
            }))
        })
        .await?;

        debug!(
            job_id = %job.job_id,
            instance_id = %job.instance_id,
            success = completion.success,
            "Job finished"
        );
        Ok(completion)
    }

    /// Polls `job` and turns a failed completion into `JobFailed`.
    ///
    /// The error renders as the remote message, unaltered.
    pub async fn await_success(
        &self,
        job: RemoteJob,
        token: &CancellationToken,
    ) -> Result<(), ImageflowError> {
        let completion = self.await_job(job, token).await?;
        if completion.success {
            Ok(())
        } else {
            Err(ImageflowError::job_failed(job.job_id.get(), completion.message))
        }
    }
}

impl std::fmt::Debug for JobPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobPoller")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
