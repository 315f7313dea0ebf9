//! Progress sink trait and implementations.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info};

/// Kind of a progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressLevel {
    /// A step transition ("Creating disk...").
    Say,
    /// Secondary detail ("--> Waiting for job 5 to complete").
    Message,
    /// A failure line.
    Error,
}

/// One line emitted to a progress sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressLine {
    /// Kind of line.
    pub level: ProgressLevel,
    /// The text as emitted.
    pub text: String,
}

impl fmt::Display for ProgressLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Receiver of human-readable progress lines.
///
/// Implementations must never fail or block for long: emission happens
/// inline on the pipeline task.
pub trait ProgressSink: Send + Sync {
    /// Reports a step transition.
    fn say(&self, text: &str);

    /// Reports secondary detail.
    fn message(&self, text: &str);

    /// Reports a failure.
    fn error(&self, text: &str);
}

/// A sink that discards every line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressSink;

impl ProgressSink for NoOpProgressSink {
    fn say(&self, _text: &str) {}

    fn message(&self, _text: &str) {}

    fn error(&self, _text: &str) {}
}

/// A sink that forwards lines into `tracing`.
///
/// This is the default sink of [`crate::pipeline::ImageBuilder`].
#[derive(Debug, Clone, Default)]
pub struct LoggingProgressSink {
    build_name: Option<String>,
}

impl LoggingProgressSink {
    /// Creates a sink that tags every line with a build name.
    #[must_use]
    pub fn named(build_name: impl Into<String>) -> Self {
        Self {
            build_name: Some(build_name.into()),
        }
    }
}

impl ProgressSink for LoggingProgressSink {
    fn say(&self, text: &str) {
        info!(build = self.build_name.as_deref(), "==> {}", text);
    }

    fn message(&self, text: &str) {
        info!(build = self.build_name.as_deref(), "    {}", text);
    }

    fn error(&self, text: &str) {
        error!(build = self.build_name.as_deref(), "==> {}", text);
    }
}

/// A sink that keeps every line, for tests and post-run inspection.
#[derive(Debug, Default)]
pub struct CollectingProgressSink {
    lines: RwLock<Vec<ProgressLine>>,
}

impl CollectingProgressSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: ProgressLevel, text: &str) {
        self.lines.write().push(ProgressLine {
            level,
            text: text.to_string(),
        });
    }

    /// Returns all collected lines.
    #[must_use]
    pub fn lines(&self) -> Vec<ProgressLine> {
        self.lines.read().clone()
    }

    /// Returns the text of every line, in order.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.lines.read().iter().map(|l| l.text.clone()).collect()
    }

    /// Returns the text of every error line, in order.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.lines
            .read()
            .iter()
            .filter(|l| l.level == ProgressLevel::Error)
            .map(|l| l.text.clone())
            .collect()
    }

    /// Returns true if any line equals `text`.
    #[must_use]
    pub fn contains(&self, text: &str) -> bool {
        self.lines.read().iter().any(|l| l.text == text)
    }

    /// Returns the number of collected lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.read().is_empty()
    }

    /// Clears all collected lines.
    pub fn clear(&self) {
        self.lines.write().clear();
    }
}

impl ProgressSink for CollectingProgressSink {
    fn say(&self, text: &str) {
        self.push(ProgressLevel::Say, text);
    }

    fn message(&self, text: &str) {
        self.push(ProgressLevel::Message, text);
    }

    fn error(&self, text: &str) {
        self.push(ProgressLevel::Error, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_noop_sink() {
        let sink = NoOpProgressSink;
        sink.say("Creating instance...");
        sink.error("Error creating instance: boom");
    }

    #[test]
    fn test_logging_sink() {
        let sink = LoggingProgressSink::named("golden");
        sink.say("Creating disk...");
        sink.message("--> Waiting for job 1 to complete");
        sink.error("Error creating disk: boom");
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingProgressSink::new();
        assert!(sink.is_empty());

        sink.say("Creating instance...");
        sink.message("--> Waiting for job 5 to complete");
        sink.error("Error creating disk: disk too large");

        assert_eq!(sink.len(), 3);
        assert_eq!(
            sink.texts(),
            vec![
                "Creating instance...",
                "--> Waiting for job 5 to complete",
                "Error creating disk: disk too large",
            ]
        );
        assert_eq!(sink.errors(), vec!["Error creating disk: disk too large"]);
        assert!(sink.contains("Creating instance..."));
    }

    #[test]
    fn test_collecting_sink_clear() {
        let sink = CollectingProgressSink::new();
        sink.say("x");
        sink.clear();
        assert!(sink.is_empty());
    }
}
