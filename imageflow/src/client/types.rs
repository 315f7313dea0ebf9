//! Value types exchanged with the remote compute API.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Returns the raw numeric identifier.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

resource_id!(
    /// Identifier of a compute instance.
    InstanceId
);
resource_id!(
    /// Identifier of a disk attached to an instance.
    DiskId
);
resource_id!(
    /// Identifier of a boot configuration.
    BootConfigId
);
resource_id!(
    /// Identifier of a server-side asynchronous job.
    JobId
);
resource_id!(
    /// Identifier of a produced image.
    ImageId
);

/// Parameters for creating an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    /// Region the instance is placed in.
    pub region: String,
    /// Instance type (plan).
    pub instance_type: String,
    /// Instance label.
    pub label: String,
    /// Tags applied to the instance.
    pub tags: Vec<String>,
    /// Optional billing term.
    pub billing_term: Option<u32>,
}

/// Parameters for creating a disk from an image.
#[derive(Clone, PartialEq, Eq)]
pub struct DiskSpec {
    /// Owning instance.
    pub instance_id: InstanceId,
    /// Source image reference.
    pub image: String,
    /// Disk label.
    pub label: String,
    /// Size in MB.
    pub size_mb: u64,
    /// Root credential set on the disk.
    pub root_pass: String,
    /// Optional authorized key for the root account.
    pub root_ssh_key: Option<String>,
}

impl fmt::Debug for DiskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskSpec")
            .field("instance_id", &self.instance_id)
            .field("image", &self.image)
            .field("label", &self.label)
            .field("size_mb", &self.size_mb)
            .field("root_pass", &"<redacted>")
            .field("root_ssh_key", &self.root_ssh_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Parameters for converting a disk into an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagizeSpec {
    /// Owning instance.
    pub instance_id: InstanceId,
    /// Disk to convert.
    pub disk_id: DiskId,
    /// Optional image description.
    pub description: Option<String>,
    /// Image label.
    pub label: String,
}

/// Reported lifecycle status of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Being created.
    Provisioning,
    /// Boot in progress.
    Booting,
    /// Up and running.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
    /// Powered off.
    Offline,
    /// Any status this engine does not interpret.
    Other(String),
}

impl InstanceStatus {
    /// Returns true if the instance reports running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisioning => write!(f, "provisioning"),
            Self::Booting => write!(f, "booting"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting_down"),
            Self::Offline => write!(f, "offline"),
            Self::Other(status) => write!(f, "{status}"),
        }
    }
}

/// A remote job together with the resource that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteJob {
    /// The owning instance, used as the polling target.
    pub instance_id: InstanceId,
    /// The job identifier.
    pub job_id: JobId,
}

impl RemoteJob {
    /// Creates a new job reference.
    #[must_use]
    pub const fn new(instance_id: InstanceId, job_id: JobId) -> Self {
        Self {
            instance_id,
            job_id,
        }
    }
}

impl fmt::Display for RemoteJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job {} on instance {}", self.job_id, self.instance_id)
    }
}

/// Snapshot of a remote job's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    /// Whether the job reached a terminal state.
    pub finished: bool,
    /// Whether the job succeeded (meaningful only once finished).
    pub success: bool,
    /// Human-readable message reported by the remote system.
    pub message: String,
}

impl JobStatus {
    /// A job that has not finished yet.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            finished: false,
            success: false,
            message: String::new(),
        }
    }

    /// A job that finished successfully.
    #[must_use]
    pub fn succeeded() -> Self {
        Self {
            finished: true,
            success: true,
            message: String::new(),
        }
    }

    /// A job that finished with a failure message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            finished: true,
            success: false,
            message: message.into(),
        }
    }

    /// Returns true if the job reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_display_and_serde() {
        let id = InstanceId(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");

        let parsed: DiskId = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, DiskId(3));
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::pending().is_terminal());
        assert!(JobStatus::succeeded().is_terminal());

        let failed = JobStatus::failed("disk too large");
        assert!(failed.is_terminal());
        assert!(!failed.success);
    }

    #[test]
    fn test_instance_status_running() {
        assert!(InstanceStatus::Running.is_running());
        assert!(!InstanceStatus::Booting.is_running());
        assert_eq!(InstanceStatus::Other("migrating".into()).to_string(), "migrating");
    }

    #[test]
    fn test_disk_spec_debug_redacts_credentials() {
        let spec = DiskSpec {
            instance_id: InstanceId(1),
            image: "linode/debian12".into(),
            label: "disk".into(),
            size_mb: 1024,
            root_pass: "hunter2".into(),
            root_ssh_key: Some("ssh-ed25519 AAAA".into()),
        };

        let rendered = format!("{spec:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("AAAA"));
    }
}
