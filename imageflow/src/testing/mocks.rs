//! Scriptable steps for runner tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

#[cfg(test)]
use crate::client::{ConnectTarget, Provisioner};
use crate::context::StateBag;
use crate::core::StepOutcome;
use crate::errors::{ImageflowError, RemoteError};
use crate::steps::{Step, StepContext};

/// Shared, ordered log of step actions (`run:a`, `compensate:a`, ...).
pub type StepLog = Arc<Mutex<Vec<String>>>;

/// Creates an empty step log.
#[must_use]
pub fn step_log() -> StepLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[cfg(test)]
mockall::mock! {
    pub Provisioner {}

    #[async_trait]
    impl Provisioner for Provisioner {
        async fn connect(&self, target: &ConnectTarget) -> anyhow::Result<()>;
        async fn provision(&self, target: &ConnectTarget) -> anyhow::Result<()>;
    }
}

#[cfg(test)]
impl MockProvisioner {
    /// A provisioner whose connect and provision always succeed.
    pub fn succeeding() -> Self {
        let mut mock = Self::new();
        mock.expect_connect().returning(|_| Ok(()));
        mock.expect_provision().returning(|_| Ok(()));
        mock
    }
}

/// A provisioner whose chosen call never completes.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangingProvisioner {
    /// Every connection attempt hangs.
    Connect,
    /// Connecting succeeds; provisioning hangs.
    Provision,
}

#[cfg(test)]
#[async_trait]
impl Provisioner for HangingProvisioner {
    async fn connect(&self, _target: &ConnectTarget) -> anyhow::Result<()> {
        if *self == Self::Connect {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn provision(&self, _target: &ConnectTarget) -> anyhow::Result<()> {
        if *self == Self::Provision {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Behavior {
    Continue,
    Halt(String),
    ContinueWithError(String),
    Cancel,
    WaitForCancel,
}

/// A step that records its actions into a shared log.
#[derive(Debug)]
pub struct RecordingStep {
    name: String,
    log: StepLog,
    behavior: Behavior,
    compensation_error: Option<String>,
}

impl RecordingStep {
    /// Creates a step that continues.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &StepLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            behavior: Behavior::Continue,
            compensation_error: None,
        }
    }

    /// Halts with a provisioning error carrying `message`.
    #[must_use]
    pub fn halting(mut self, message: impl Into<String>) -> Self {
        self.behavior = Behavior::Halt(message.into());
        self
    }

    /// Stores an error but still reports `Continue`.
    #[must_use]
    pub fn storing_error(mut self, message: impl Into<String>) -> Self {
        self.behavior = Behavior::ContinueWithError(message.into());
        self
    }

    /// Reports `Cancelled` without storing an error.
    #[must_use]
    pub fn cancelling(mut self) -> Self {
        self.behavior = Behavior::Cancel;
        self
    }

    /// Blocks until the run is cancelled.
    #[must_use]
    pub fn waiting_for_cancel(mut self) -> Self {
        self.behavior = Behavior::WaitForCancel;
        self
    }

    /// Fails its compensation with a transport error carrying `message`.
    #[must_use]
    pub fn failing_compensation(mut self, message: impl Into<String>) -> Self {
        self.compensation_error = Some(message.into());
        self
    }

    fn record(&self, action: &str) {
        self.log.lock().push(format!("{action}:{}", self.name));
    }
}

#[async_trait]
impl Step for RecordingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &mut StateBag, ctx: &StepContext) -> StepOutcome {
        self.record("run");
        match &self.behavior {
            Behavior::Continue => StepOutcome::Continue,
            Behavior::Halt(message) => {
                state.set_error(ImageflowError::Provision(message.clone()));
                StepOutcome::Halt
            }
            Behavior::ContinueWithError(message) => {
                state.set_error(ImageflowError::Provision(message.clone()));
                StepOutcome::Continue
            }
            Behavior::Cancel => StepOutcome::Cancelled,
            Behavior::WaitForCancel => {
                ctx.token().cancelled().await;
                state.set_error(ctx.token().error());
                StepOutcome::Cancelled
            }
        }
    }

    async fn compensate(
        &self,
        _state: &mut StateBag,
        _ctx: &StepContext,
    ) -> Result<(), ImageflowError> {
        self.record("compensate");
        match &self.compensation_error {
            Some(message) => Err(RemoteError::transport(message.clone()).into()),
            None => Ok(()),
        }
    }

    async fn teardown(&self, _state: &StateBag, _ctx: &StepContext) -> Result<(), ImageflowError> {
        self.record("teardown");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StepHarness;
    use crate::testing::ScriptedComputeApi;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_recording_step_logs_actions() {
        let log = step_log();
        let mut h = StepHarness::new(ScriptedComputeApi::new());
        let step = RecordingStep::new("a", &log).failing_compensation("boom");

        assert_eq!(step.run(&mut h.state, &h.ctx).await, StepOutcome::Continue);
        assert!(step.compensate(&mut h.state, &h.ctx).await.is_err());
        step.teardown(&h.state, &h.ctx).await.unwrap();

        assert_eq!(*log.lock(), vec!["run:a", "compensate:a", "teardown:a"]);
    }

    #[tokio::test]
    async fn test_halting_step_stores_error() {
        let log = step_log();
        let mut h = StepHarness::new(ScriptedComputeApi::new());
        let step = RecordingStep::new("b", &log).halting("disk too large");

        assert_eq!(step.run(&mut h.state, &h.ctx).await, StepOutcome::Halt);
        assert_eq!(h.state.error().unwrap().to_string(), "disk too large");
    }
}
