//! The step runner.
//!
//! Runs steps strictly in order on the calling task. The first step that
//! halts, or a cancellation observed between steps, stops forward progress;
//! every step that had completed is then compensated in reverse order of
//! completion. Compensation failures are collected and attached to the
//! primary error, never replacing it.

use crate::cancellation::CancellationToken;
use crate::context::{keys, StateBag};
use crate::core::StepOutcome;
use crate::errors::{CompensationErrors, ImageflowError};
use crate::events::{NoOpProgressSink, ProgressSink};
use crate::steps::{Step, StepContext};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every step continued.
    Succeeded,
    /// A step halted; carries the primary error plus compensation failures.
    Halted(ImageflowError),
    /// The run was cancelled; carries the cancellation plus compensation
    /// failures.
    Cancelled(ImageflowError),
}

impl RunOutcome {
    /// Returns true if every step continued.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true if the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns the error of a stopped run.
    #[must_use]
    pub fn error(&self) -> Option<&ImageflowError> {
        match self {
            Self::Succeeded => None,
            Self::Halted(error) | Self::Cancelled(error) => Some(error),
        }
    }
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunReport {
    /// The final state bag.
    pub state: StateBag,
    /// Steps whose run action completed, in order.
    pub completed: Vec<String>,
    /// Steps whose compensation was invoked, in invocation order.
    pub compensated: Vec<String>,
    /// Failures while tearing down transient resources after success.
    pub teardown_errors: CompensationErrors,
    /// How the run ended.
    pub outcome: RunOutcome,
}

impl RunReport {
    /// Returns the final state, or the combined error of a stopped run.
    pub fn into_result(self) -> Result<StateBag, ImageflowError> {
        match self.outcome {
            RunOutcome::Succeeded => Ok(self.state),
            RunOutcome::Halted(error) | RunOutcome::Cancelled(error) => Err(error),
        }
    }
}

/// Executes an ordered list of steps.
pub struct StepRunner {
    steps: Vec<Box<dyn Step>>,
    sink: Arc<dyn ProgressSink>,
    token: Arc<CancellationToken>,
}

impl StepRunner {
    /// Creates a runner over `steps` with a silent sink and its own token.
    #[must_use]
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            steps,
            sink: Arc::new(NoOpProgressSink),
            token: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the progress sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Shares an external cancellation token.
    #[must_use]
    pub fn with_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.token = token;
        self
    }

    /// Returns the cancellation token observed by the run.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Returns the step names, in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Runs every step against `state`.
    ///
    /// Returns only once any compensation has finished.
    pub async fn run(&self, state: StateBag) -> RunReport {
        let span = info_span!(
            "pipeline.run",
            run_id = %state.identity().run_id_str(),
            steps = self.steps.len(),
        );
        self.execute(state).instrument(span).await
    }

    async fn execute(&self, mut state: StateBag) -> RunReport {
        let ctx = StepContext::new(self.sink.clone(), self.token.clone());
        let mut completed: Vec<&dyn Step> = Vec::with_capacity(self.steps.len());
        let mut stopped = None;

        for step in &self.steps {
            if self.token.is_cancelled() {
                info!(step = step.name(), "Cancellation observed before step");
                stopped = Some(StepOutcome::Cancelled);
                break;
            }

            info!(step = step.name(), "step.started");
            let started = Instant::now();
            let mut outcome = step.run(&mut state, &ctx).await;
            if outcome.is_continue() && state.has_error() {
                outcome = StepOutcome::Halt;
            }
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            if outcome.is_stop() {
                warn!(step = step.name(), %outcome, elapsed_ms, "step.halted");
                stopped = Some(outcome);
                break;
            }
            info!(step = step.name(), elapsed_ms, "step.completed");
            completed.push(step.as_ref());
        }

        let completed_names = completed.iter().map(|s| s.name().to_string()).collect();
        let Some(outcome) = stopped else {
            let teardown_errors = self.teardown(&completed, &state, &ctx).await;
            info!(steps = completed.len(), "Pipeline succeeded");
            return RunReport {
                state,
                completed: completed_names,
                compensated: Vec::new(),
                teardown_errors,
                outcome: RunOutcome::Succeeded,
            };
        };

        let primary = match state.take_error() {
            Some(error) => error,
            None if outcome == StepOutcome::Cancelled || self.token.is_cancelled() => {
                self.token.error()
            }
            None => ImageflowError::MissingState(keys::ERROR),
        };
        let cancelled = outcome == StepOutcome::Cancelled || primary.is_cancellation();

        let (compensated, failures) = self.compensate(&completed, &mut state, &ctx).await;
        let error = failures.attach_to(primary);

        warn!(
            error = %error,
            cancelled,
            compensated = compensated.len(),
            "Pipeline stopped"
        );
        RunReport {
            state,
            completed: completed_names,
            compensated,
            teardown_errors: CompensationErrors::new(),
            outcome: if cancelled {
                RunOutcome::Cancelled(error)
            } else {
                RunOutcome::Halted(error)
            },
        }
    }

    /// Compensates `completed` in reverse order, collecting failures.
    ///
    /// Uses a fresh token so the unwind finishes after a cancellation.
    async fn compensate(
        &self,
        completed: &[&dyn Step],
        state: &mut StateBag,
        ctx: &StepContext,
    ) -> (Vec<String>, CompensationErrors) {
        let mut compensated = Vec::with_capacity(completed.len());
        let mut failures = CompensationErrors::new();
        if completed.is_empty() {
            return (compensated, failures);
        }

        self.sink.say("Cleaning up...");
        let ctx = ctx.detached();
        for step in completed.iter().rev() {
            let result = step.compensate(state, &ctx).await;
            compensated.push(step.name().to_string());
            match result {
                Ok(()) => info!(step = step.name(), "step.compensated"),
                Err(error) => {
                    warn!(step = step.name(), error = %error, "Compensation failed");
                    failures.push(step.name(), error);
                }
            }
        }
        (compensated, failures)
    }

    /// Releases transient resources of a successful run in reverse order.
    async fn teardown(
        &self,
        completed: &[&dyn Step],
        state: &StateBag,
        ctx: &StepContext,
    ) -> CompensationErrors {
        let mut failures = CompensationErrors::new();
        let ctx = ctx.detached();
        for step in completed.iter().rev() {
            if let Err(error) = step.teardown(state, &ctx).await {
                warn!(step = step.name(), error = %error, "Teardown failed");
                failures.push(step.name(), error);
            }
        }
        failures
    }
}

impl std::fmt::Debug for StepRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRunner")
            .field("steps", &self.step_names())
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::errors::ErrorKind;
    use crate::events::CollectingProgressSink;
    use crate::testing::{
        assert_compensated, assert_error_kind, assert_log, assert_no_compensation, step_log,
        RecordingStep, StepLog,
    };
    use pretty_assertions::assert_eq;

    fn state() -> StateBag {
        StateBag::new(Arc::new(PipelineConfig::default()))
    }

    fn steps(log: &StepLog, names: &[&str]) -> Vec<Box<dyn Step>> {
        names
            .iter()
            .map(|name| Box::new(RecordingStep::new(*name, log)) as Box<dyn Step>)
            .collect()
    }

    #[tokio::test]
    async fn test_all_continue_runs_in_order_without_compensation() {
        let log = step_log();
        let runner = StepRunner::new(steps(&log, &["a", "b", "c"]));

        let report = runner.run(state()).await;

        assert!(report.outcome.is_success());
        assert_eq!(report.completed, vec!["a", "b", "c"]);
        assert!(report.compensated.is_empty());
        assert_no_compensation(&log);
        assert_log(
            &log,
            &["run:a", "run:b", "run:c", "teardown:c", "teardown:b", "teardown:a"],
        );
    }

    #[tokio::test]
    async fn test_halt_compensates_prior_steps_in_reverse() {
        for k in 0..4 {
            let log = step_log();
            let names = ["s0", "s1", "s2", "s3"];
            let mut list: Vec<Box<dyn Step>> = Vec::new();
            for (i, name) in names.iter().enumerate() {
                let step = RecordingStep::new(*name, &log);
                list.push(Box::new(if i == k { step.halting("boom") } else { step }));
            }

            let report = StepRunner::new(list).run(state()).await;

            let expected: Vec<&str> = names[..k].iter().rev().copied().collect();
            assert_compensated(&log, &expected);
            assert_eq!(report.compensated, expected);
            assert!(!log.lock().contains(&format!("run:s{}", k + 1)));
            assert_eq!(report.outcome.error().unwrap().to_string(), "boom");
        }
    }

    #[tokio::test]
    async fn test_continue_with_stored_error_halts() {
        let log = step_log();
        let runner = StepRunner::new(vec![
            Box::new(RecordingStep::new("a", &log)),
            Box::new(RecordingStep::new("b", &log).storing_error("sneaky")),
            Box::new(RecordingStep::new("c", &log)),
        ]);

        let report = runner.run(state()).await;

        assert_log(&log, &["run:a", "run:b", "compensate:a"]);
        assert!(matches!(report.outcome, RunOutcome::Halted(_)));
        assert_eq!(report.completed, vec!["a"]);
    }

    #[tokio::test]
    async fn test_compensation_errors_are_aggregated_after_primary() {
        let log = step_log();
        let sink = Arc::new(CollectingProgressSink::new());
        let runner = StepRunner::new(vec![
            Box::new(RecordingStep::new("a", &log).failing_compensation("delete failed")),
            Box::new(RecordingStep::new("b", &log).failing_compensation("detach failed")),
            Box::new(RecordingStep::new("c", &log).halting("disk too large")),
        ])
        .with_sink(sink.clone());

        let err = runner.run(state()).await.into_result().unwrap_err();

        assert_compensated(&log, &["b", "a"]);
        assert_eq!(
            err.to_string(),
            "disk too large; 2 compensation error(s): b: detach failed; a: delete failed"
        );
        assert_eq!(err.root().to_string(), "disk too large");
        assert_eq!(err.compensation_errors().unwrap().len(), 2);
        assert_eq!(sink.texts(), vec!["Cleaning up..."]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let log = step_log();
        let runner = StepRunner::new(steps(&log, &["a", "b"]));
        runner.token().cancel("stop requested");

        let report = runner.run(state()).await;

        assert!(report.outcome.is_cancelled());
        assert!(log.lock().is_empty());
        assert_eq!(report.outcome.error().unwrap().to_string(), "stop requested");
    }

    #[tokio::test]
    async fn test_cancelled_outcome_without_error_uses_default_reason() {
        let log = step_log();
        let runner = StepRunner::new(vec![
            Box::new(RecordingStep::new("a", &log)),
            Box::new(RecordingStep::new("b", &log).cancelling()),
        ]);

        let report = runner.run(state()).await;

        let err = report.outcome.error().unwrap();
        assert_error_kind(err, ErrorKind::Cancellation);
        assert_eq!(err.to_string(), "Build was cancelled.");
        assert_compensated(&log, &["a"]);
    }

    #[tokio::test]
    async fn test_cancel_during_step_unwinds_before_returning() {
        let log = step_log();
        let runner = Arc::new(StepRunner::new(vec![
            Box::new(RecordingStep::new("a", &log)),
            Box::new(RecordingStep::new("b", &log)),
            Box::new(RecordingStep::new("c", &log).waiting_for_cancel()),
            Box::new(RecordingStep::new("d", &log)),
        ]));

        let handle = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run(state()).await })
        };
        while !log.lock().contains(&"run:c".to_string()) {
            tokio::task::yield_now().await;
        }
        runner.token().cancel("interrupted");
        let report = handle.await.unwrap();

        assert!(report.outcome.is_cancelled());
        assert_log(&log, &["run:a", "run:b", "run:c", "compensate:b", "compensate:a"]);
    }

    #[tokio::test]
    async fn test_halt_without_error_is_reported() {
        struct Silent;

        #[async_trait::async_trait]
        impl Step for Silent {
            fn name(&self) -> &str {
                "silent"
            }

            async fn run(&self, _state: &mut StateBag, _ctx: &StepContext) -> StepOutcome {
                StepOutcome::Halt
            }
        }

        let report = StepRunner::new(vec![Box::new(Silent)]).run(state()).await;

        assert_error_kind(report.outcome.error().unwrap(), ErrorKind::Internal);
    }
}
