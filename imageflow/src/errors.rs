//! Error types for the imageflow engine.
//!
//! The taxonomy separates configuration problems, single remote-call
//! failures, failed remote jobs, deadlines, cancellation and the errors
//! collected while unwinding already-completed steps.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Broad classification of an [`ImageflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input was missing or invalid before the pipeline started.
    Configuration,
    /// A single remote call failed at the transport or parse level.
    RemoteRequest,
    /// A polled remote job finished unsuccessfully.
    RemoteJob,
    /// A poll loop exceeded its deadline.
    Timeout,
    /// An external stop was requested.
    Cancellation,
    /// The provisioning collaborator failed.
    Provisioning,
    /// One or more compensating actions failed.
    Compensation,
    /// Broken engine invariant (e.g. missing state entry).
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::RemoteRequest => write!(f, "remote_request"),
            Self::RemoteJob => write!(f, "remote_job"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancellation => write!(f, "cancellation"),
            Self::Provisioning => write!(f, "provisioning"),
            Self::Compensation => write!(f, "compensation"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// The main error type for imageflow operations.
#[derive(Debug, Error)]
pub enum ImageflowError {
    /// Configuration was rejected.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A remote API call failed.
    #[error("{0}")]
    Remote(#[from] RemoteError),

    /// A remote job reached a terminal state with a failure indicator.
    ///
    /// Displays the remote message verbatim.
    #[error("{message}")]
    JobFailed {
        /// The failed job.
        job_id: u64,
        /// Human-readable failure message supplied by the remote system.
        message: String,
    },

    /// A poll loop gave up after its deadline.
    #[error("Timed out after {}s waiting for {what}", .after.as_secs_f64())]
    Timeout {
        /// What was being waited on.
        what: String,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The run was cancelled.
    #[error("{0}")]
    Cancelled(String),

    /// The provisioning collaborator reported a failure.
    #[error("{0}")]
    Provision(String),

    /// A state entry a step depends on was never populated.
    #[error("Cannot find {0} in state")]
    MissingState(&'static str),

    /// An error annotated with the step context it occurred in.
    #[error("{context}: {source}")]
    Step {
        /// Context prefix, e.g. "Error creating disk".
        context: String,
        /// The underlying error.
        #[source]
        source: Box<ImageflowError>,
    },

    /// Compensation failures on their own.
    #[error("{0}")]
    Compensation(CompensationErrors),

    /// A halting error combined with the compensation failures that
    /// followed it. The primary failure is always rendered first.
    #[error("{primary}; {compensation}")]
    Halted {
        /// The error that stopped forward progress.
        primary: Box<ImageflowError>,
        /// Failures collected while unwinding.
        compensation: CompensationErrors,
    },
}

impl ImageflowError {
    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            after,
        }
    }

    /// Creates a remote job failure carrying the remote message.
    #[must_use]
    pub fn job_failed(job_id: u64, message: impl Into<String>) -> Self {
        Self::JobFailed {
            job_id,
            message: message.into(),
        }
    }

    /// Wraps this error with a step context prefix.
    #[must_use]
    pub fn in_step(self, context: impl Into<String>) -> Self {
        Self::Step {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classifies the error.
    ///
    /// Context wrappers and combined errors report the kind of the
    /// primary failure they carry.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Remote(_) => ErrorKind::RemoteRequest,
            Self::JobFailed { .. } => ErrorKind::RemoteJob,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled(_) => ErrorKind::Cancellation,
            Self::Provision(_) => ErrorKind::Provisioning,
            Self::MissingState(_) => ErrorKind::Internal,
            Self::Compensation(_) => ErrorKind::Compensation,
            Self::Step { source, .. } => source.kind(),
            Self::Halted { primary, .. } => primary.kind(),
        }
    }

    /// Returns true if this error stems from cancellation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }

    /// Returns the innermost error, skipping step context and combination
    /// wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Step { source, .. } => source.root(),
            Self::Halted { primary, .. } => primary.root(),
            other => other,
        }
    }

    /// Returns the compensation failures attached to this error, if any.
    #[must_use]
    pub fn compensation_errors(&self) -> Option<&CompensationErrors> {
        match self {
            Self::Halted { compensation, .. } | Self::Compensation(compensation) => {
                Some(compensation)
            }
            _ => None,
        }
    }
}

/// A single problem inside a remote multi-error response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    /// Remote error code.
    pub code: i64,
    /// Remote error message.
    pub message: String,
}

impl ApiError {
    /// Creates a new API error.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request never produced a usable response.
    #[error("{0}")]
    Transport(String),

    /// The response body could not be understood.
    #[error("Malformed response: {0}")]
    Parse(String),

    /// The remote system rejected the request with one or more errors.
    #[error("{}", join_api_errors(.0))]
    Api(Vec<ApiError>),
}

impl RemoteError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a single-entry API error.
    #[must_use]
    pub fn api(code: i64, message: impl Into<String>) -> Self {
        Self::Api(vec![ApiError::new(code, message)])
    }
}

fn join_api_errors(errors: &[ApiError]) -> String {
    match errors {
        [] => "Remote request failed".to_string(),
        [single] => single.message.clone(),
        many => format!(
            "{} errors occurred: {}",
            many.len(),
            many.iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        ),
    }
}

/// Every problem found while validating configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", render_problems(.problems))]
pub struct ConfigError {
    /// The individual problems, in discovery order.
    pub problems: Vec<String>,
}

impl ConfigError {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an error with a single problem.
    #[must_use]
    pub fn single(problem: impl Into<String>) -> Self {
        Self {
            problems: vec![problem.into()],
        }
    }

    /// Records a problem.
    pub fn push(&mut self, problem: impl Into<String>) {
        self.problems.push(problem.into());
    }

    /// Returns true if no problems were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// Returns `Ok(())` when empty, otherwise the collected error.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn render_problems(problems: &[String]) -> String {
    match problems {
        [] => "Invalid configuration".to_string(),
        [single] => single.clone(),
        many => format!("{} configuration errors: {}", many.len(), many.join("; ")),
    }
}

/// A failed compensating action.
#[derive(Debug)]
pub struct CompensationFailure {
    /// The step whose compensation failed.
    pub step: String,
    /// The error it reported.
    pub error: ImageflowError,
}

/// Multi-error collector for the unwind phase.
#[derive(Debug, Default, Error)]
#[error("{}", render_failures(.failures))]
pub struct CompensationErrors {
    failures: Vec<CompensationFailure>,
}

impl CompensationErrors {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a compensation failure.
    pub fn push(&mut self, step: impl Into<String>, error: ImageflowError) {
        self.failures.push(CompensationFailure {
            step: step.into(),
            error,
        });
    }

    /// Returns the recorded failures in the order they happened.
    #[must_use]
    pub fn failures(&self) -> &[CompensationFailure] {
        &self.failures
    }

    /// Returns the number of failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Combines a primary error with the collected failures.
    ///
    /// The primary error is returned unchanged when nothing failed.
    #[must_use]
    pub fn attach_to(self, primary: ImageflowError) -> ImageflowError {
        if self.is_empty() {
            primary
        } else {
            ImageflowError::Halted {
                primary: Box::new(primary),
                compensation: self,
            }
        }
    }

    /// Returns `Ok(())` when empty, otherwise a compensation error.
    pub fn into_result(self) -> Result<(), ImageflowError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ImageflowError::Compensation(self))
        }
    }
}

fn render_failures(failures: &[CompensationFailure]) -> String {
    let rendered = failures
        .iter()
        .map(|f| format!("{}: {}", f.step, f.error))
        .collect::<Vec<_>>()
        .join("; ");
    format!("{} compensation error(s): {}", failures.len(), rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_job_failed_displays_remote_message_verbatim() {
        let err = ImageflowError::job_failed(12, "Disk image too small: need 2048MB");
        assert_eq!(err.to_string(), "Disk image too small: need 2048MB");
        assert_eq!(err.kind(), ErrorKind::RemoteJob);
    }

    #[test]
    fn test_step_context_keeps_root() {
        let err = ImageflowError::job_failed(1, "disk too large").in_step("Error creating disk");
        assert_eq!(err.to_string(), "Error creating disk: disk too large");
        assert_eq!(err.root().to_string(), "disk too large");
        assert_eq!(err.kind(), ErrorKind::RemoteJob);
    }

    #[test]
    fn test_remote_multi_error_display() {
        let err = RemoteError::Api(vec![
            ApiError::new(8, "Authentication failed"),
            ApiError::new(6, "Rate limited"),
        ]);
        assert_eq!(
            err.to_string(),
            "2 errors occurred: Authentication failed; Rate limited"
        );

        let single = RemoteError::api(4, "disk too large");
        assert_eq!(single.to_string(), "disk too large");
    }

    #[test]
    fn test_config_error_collects_all_problems() {
        let mut err = ConfigError::new();
        assert!(err.clone().into_result().is_ok());

        err.push("token is required");
        err.push("region is required");

        assert_eq!(
            err.to_string(),
            "2 configuration errors: token is required; region is required"
        );
        assert!(err.into_result().is_err());
    }

    #[test]
    fn test_compensation_errors_keep_primary_first() {
        let mut errors = CompensationErrors::new();
        errors.push("create_disk", RemoteError::transport("connection reset").into());

        let combined = errors.attach_to(ImageflowError::Provision("ansible failed".into()));
        let text = combined.to_string();

        assert!(text.starts_with("ansible failed"));
        assert!(text.contains("create_disk: connection reset"));
        assert_eq!(combined.kind(), ErrorKind::Provisioning);
        assert_eq!(combined.compensation_errors().map(CompensationErrors::len), Some(1));
    }

    #[test]
    fn test_empty_compensation_returns_primary_unchanged() {
        let primary = ImageflowError::cancelled("stop");
        let combined = CompensationErrors::new().attach_to(primary);
        assert!(matches!(combined, ImageflowError::Cancelled(_)));
        assert!(combined.is_cancellation());
    }

    #[test]
    fn test_timeout_display() {
        let err = ImageflowError::timeout("job 5", Duration::from_secs(360));
        assert_eq!(err.to_string(), "Timed out after 360s waiting for job 5");
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}
