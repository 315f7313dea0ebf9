//! Pipeline configuration.
//!
//! Configuration is resolved once before a run starts: parsed from JSON,
//! completed from the environment and defaults, then validated. Every
//! validation problem is reported together.

use crate::errors::ConfigError;
use crate::utils::{default_image_label, default_instance_label};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable consulted when no token is configured.
pub const TOKEN_ENV: &str = "IMAGEFLOW_TOKEN";

/// Environment variable consulted when no API URL is configured.
pub const API_URL_ENV: &str = "IMAGEFLOW_API_URL";

/// Kernel used when none is configured.
pub const DEFAULT_KERNEL: &str = "linode/latest-64bit";

/// Immutable, validated input for a pipeline run.
#[derive(Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// API token.
    ///
    /// The engine never dials the API itself; callers pass this to the
    /// [`ComputeApi`](crate::client::ComputeApi) client they construct.
    #[serde(default)]
    pub token: String,
    /// Optional API endpoint override, for the caller-built client.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Region to create the instance in.
    #[serde(default)]
    pub region: String,
    /// Instance type (plan).
    #[serde(default)]
    pub instance_type: String,
    /// Source image the disk is created from.
    #[serde(default)]
    pub image: String,
    /// Disk size in MB.
    #[serde(default = "default_disk_size")]
    pub disk_size: u64,
    /// Root credential, also used to connect for provisioning.
    #[serde(default)]
    pub root_pass: String,
    /// Optional authorized key for the root account.
    #[serde(default)]
    pub root_ssh_key: Option<String>,
    /// Optional billing term for the instance.
    #[serde(default)]
    pub billing_term: Option<u32>,
    /// Kernel for the boot configuration.
    #[serde(default = "default_kernel")]
    pub kernel: String,
    /// Label for the instance, disk and boot configuration.
    #[serde(default)]
    pub label: String,
    /// Label for the produced image.
    #[serde(default)]
    pub image_label: String,
    /// Optional description for the produced image.
    #[serde(default)]
    pub description: Option<String>,
    /// Tags applied to the instance.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Deadline in seconds for every job or status poll.
    #[serde(default = "default_state_timeout")]
    pub state_timeout_secs: u64,
    /// Interval in milliseconds between polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Connection attempts before provisioning gives up.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Delay in milliseconds between connection attempts.
    #[serde(default = "default_connect_retry_interval")]
    pub connect_retry_interval_ms: u64,
}

fn default_disk_size() -> u64 {
    25_600
}

fn default_kernel() -> String {
    DEFAULT_KERNEL.to_string()
}

fn default_state_timeout() -> u64 {
    360
}

fn default_poll_interval() -> u64 {
    2_000
}

fn default_connect_attempts() -> u32 {
    5
}

fn default_connect_retry_interval() -> u64 {
    2_000
}

fn tag_pattern() -> Option<&'static Regex> {
    static TAG: OnceLock<Option<Regex>> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"^[[:alnum:]:_-]{1,255}$").ok())
        .as_ref()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: None,
            region: String::new(),
            instance_type: String::new(),
            image: String::new(),
            disk_size: default_disk_size(),
            root_pass: String::new(),
            root_ssh_key: None,
            billing_term: None,
            kernel: default_kernel(),
            label: String::new(),
            image_label: String::new(),
            description: None,
            tags: Vec::new(),
            state_timeout_secs: default_state_timeout(),
            poll_interval_ms: default_poll_interval(),
            connect_attempts: default_connect_attempts(),
            connect_retry_interval_ms: default_connect_retry_interval(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with the required fields set.
    #[must_use]
    pub fn new(
        region: impl Into<String>,
        instance_type: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            instance_type: instance_type.into(),
            image: image.into(),
            ..Self::default()
        }
    }

    /// Parses, completes and validates a JSON configuration.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| ConfigError::single(format!("invalid configuration: {e}")))?;
        config.resolve()
    }

    /// Fills defaults from the environment and generated labels, then
    /// validates.
    pub fn resolve(mut self) -> Result<Self, ConfigError> {
        if self.token.is_empty() {
            if let Ok(token) = std::env::var(TOKEN_ENV) {
                self.token = token;
            }
        }
        if self.api_url.is_none() {
            self.api_url = std::env::var(API_URL_ENV).ok().filter(|u| !u.is_empty());
        }
        if self.label.is_empty() {
            self.label = default_instance_label();
        }
        if self.image_label.is_empty() {
            self.image_label = default_image_label();
        }
        if self.kernel.is_empty() {
            self.kernel = default_kernel();
        }

        self.validate()?;
        Ok(self)
    }

    /// Checks every field and reports all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errs = ConfigError::new();

        if self.token.is_empty() {
            errs.push("token is required");
        }
        if self.region.is_empty() {
            errs.push("region is required");
        }
        if self.instance_type.is_empty() {
            errs.push("instance_type is required");
        }
        if self.image.is_empty() {
            errs.push("image is required");
        }
        if self.root_pass.is_empty() {
            errs.push("root_pass is required");
        }
        if self.disk_size == 0 {
            errs.push("disk_size must be greater than zero");
        }
        if self.label.is_empty() {
            errs.push("label is required");
        }
        if self.image_label.is_empty() {
            errs.push("image_label is required");
        }
        if self.state_timeout_secs == 0 {
            errs.push("state_timeout_secs must be greater than zero");
        }
        if self.poll_interval_ms == 0 {
            errs.push("poll_interval_ms must be greater than zero");
        }
        if self.connect_attempts == 0 {
            errs.push("connect_attempts must be at least 1");
        }
        for tag in &self.tags {
            if !tag_pattern().is_some_and(|re| re.is_match(tag)) {
                errs.push(format!("invalid tag: {tag}"));
            }
        }

        errs.into_result()
    }

    /// Sets the token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Sets the root credential.
    #[must_use]
    pub fn with_root_pass(mut self, root_pass: impl Into<String>) -> Self {
        self.root_pass = root_pass.into();
        self
    }

    /// Sets the disk size in MB.
    #[must_use]
    pub fn with_disk_size(mut self, size_mb: u64) -> Self {
        self.disk_size = size_mb;
        self
    }

    /// Sets the instance label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the image label.
    #[must_use]
    pub fn with_image_label(mut self, label: impl Into<String>) -> Self {
        self.image_label = label.into();
        self
    }

    /// Sets the image description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the kernel.
    #[must_use]
    pub fn with_kernel(mut self, kernel: impl Into<String>) -> Self {
        self.kernel = kernel.into();
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets the poll deadline.
    #[must_use]
    pub fn with_state_timeout(mut self, timeout: Duration) -> Self {
        self.state_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the connection retry budget.
    #[must_use]
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    /// Gets the poll deadline as a Duration.
    #[must_use]
    pub fn state_timeout(&self) -> Duration {
        Duration::from_secs(self.state_timeout_secs)
    }

    /// Gets the poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Gets the delay between connection attempts as a Duration.
    #[must_use]
    pub fn connect_retry_interval(&self) -> Duration {
        Duration::from_millis(self.connect_retry_interval_ms)
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("region", &self.region)
            .field("instance_type", &self.instance_type)
            .field("image", &self.image)
            .field("disk_size", &self.disk_size)
            .field("root_pass", &"<redacted>")
            .field("billing_term", &self.billing_term)
            .field("kernel", &self.kernel)
            .field("label", &self.label)
            .field("image_label", &self.image_label)
            .field("description", &self.description)
            .field("tags", &self.tags)
            .field("state_timeout_secs", &self.state_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("connect_attempts", &self.connect_attempts)
            .finish_non_exhaustive()
    }
}
