//! Remote control-plane client
//!
//! [`ControlPlane`] is the seam between the reconciler and the remote API.
//! [`HttpControlPlane`] talks to the REST 2.0 endpoints; tests substitute
//! the in-memory mock.

pub mod http;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::cluster::{ClusterInfo, ClusterSpec};
use crate::library::{LibrarySpec, LibraryStatus};

pub use http::{ApiErrorBody, HttpControlPlane};

/// Error codes the control plane uses for missing resources
pub(crate) const NOT_FOUND_CODES: [&str; 2] = ["RESOURCE_DOES_NOT_EXIST", "NOT_FOUND"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Transport(String),

    #[error("Authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    /// Displays the remote message verbatim
    #[error("{message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("JSON parse error: {0}")]
    Parse(String),
}

impl ClientError {
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        ClientError::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// A 404 with the canonical not-found code
    pub fn not_found(message: impl Into<String>) -> Self {
        ClientError::api(404, "RESOURCE_DOES_NOT_EXIST", message)
    }

    /// The addressed resource does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            ClientError::Api { status, code, .. } => {
                *status == 404 || NOT_FOUND_CODES.contains(&code.as_str())
            }
            _ => false,
        }
    }

    /// Failure of the connection rather than a decision of the remote side
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Parse(_))
    }
}

/// Typed operations of the remote control plane.
///
/// Implementations must be safe to call concurrently for different cluster
/// identifiers. Nothing here serializes calls for the same identifier.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create a cluster; the identifier is returned before it is running
    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<String, ClientError>;

    /// Fetch observed state; fails with a not-found API error when absent
    async fn get_cluster(&self, cluster_id: &str) -> Result<ClusterInfo, ClientError>;

    async fn start_cluster(&self, cluster_id: &str) -> Result<(), ClientError>;

    async fn edit_cluster(&self, cluster_id: &str, spec: &ClusterSpec)
        -> Result<(), ClientError>;

    /// Terminate a cluster, keeping its record
    async fn delete_cluster(&self, cluster_id: &str) -> Result<(), ClientError>;

    /// Purge a terminated cluster's record
    async fn permanent_delete_cluster(&self, cluster_id: &str) -> Result<(), ClientError>;

    async fn library_statuses(&self, cluster_id: &str) -> Result<Vec<LibraryStatus>, ClientError>;

    async fn install_libraries(
        &self,
        cluster_id: &str,
        libraries: &[LibrarySpec],
    ) -> Result<(), ClientError>;

    async fn uninstall_libraries(
        &self,
        cluster_id: &str,
        libraries: &[LibrarySpec],
    ) -> Result<(), ClientError>;
}
