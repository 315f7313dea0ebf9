//! The provisioning collaborator seam.

use async_trait::async_trait;
use std::fmt;

/// Default user for provisioning connections.
pub const DEFAULT_CONNECT_USER: &str = "root";

/// Default port for provisioning connections.
pub const DEFAULT_CONNECT_PORT: u16 = 22;

/// Where and how the provisioning collaborator should connect.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Address discovered for the instance.
    pub address: String,
    /// Port to connect to.
    pub port: u16,
    /// User to authenticate as.
    pub user: String,
    /// Connection credential.
    pub credential: String,
}

impl ConnectTarget {
    /// Creates a target for the default user and port.
    #[must_use]
    pub fn new(address: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_CONNECT_PORT,
            user: DEFAULT_CONNECT_USER.to_string(),
            credential: credential.into(),
        }
    }

    /// Returns `address:port`.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// Opaque external provisioning logic run against a booted instance.
///
/// The engine only forwards success or failure; errors are carried as
/// [`anyhow::Error`] because their internals are not interpreted.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Dials a fresh connection to the target.
    async fn connect(&self, target: &ConnectTarget) -> anyhow::Result<()>;

    /// Runs provisioning over the established connection.
    async fn provision(&self, target: &ConnectTarget) -> anyhow::Result<()>;
}
