//! Failure taxonomy of a reconciliation and the stage it stopped at

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::client::{ClientError, NOT_FOUND_CODES};
use crate::cluster::{Action, Phase, ValidationError};
use crate::library::LibraryStatus;
use crate::poll::PollError;

/// Why a reconciliation stopped short of the desired state
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("invalid cluster spec: {0}")]
    Validation(#[from] ValidationError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    /// Remote rejection; displays the remote message verbatim
    #[error("{message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("timed out after {elapsed:?} waiting for {what}")]
    ConvergenceTimeout { what: String, elapsed: Duration },

    #[error("{} libraries failed to install: {}", failed.len(), describe_failures(failed))]
    PartialConvergence { failed: Vec<LibraryStatus> },

    #[error("cluster {cluster_id} is {phase}: {message}")]
    ClusterFailed {
        cluster_id: String,
        phase: Phase,
        message: String,
    },

    #[error("cancelled while waiting for {0}")]
    Cancelled(String),

    #[error("cluster {cluster_id} is {phase}, which does not permit {action}")]
    InvalidPhase {
        cluster_id: String,
        phase: Phase,
        action: Action,
    },
}

fn describe_failures(failed: &[LibraryStatus]) -> String {
    failed
        .iter()
        .map(|s| {
            if s.messages.is_empty() {
                format!("{} ({})", s.library, s.status)
            } else {
                format!("{} ({}: {})", s.library, s.status, s.messages.join("; "))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl ReconcileError {
    /// Remote error code, for API rejections
    pub fn code(&self) -> Option<&str> {
        match self {
            ReconcileError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// The control plane reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        match self {
            ReconcileError::Api { status, code, .. } => {
                *status == 404 || NOT_FOUND_CODES.contains(&code.as_str())
            }
            _ => false,
        }
    }
}

impl From<ClientError> for ReconcileError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Transport(msg) => ReconcileError::Transport(msg),
            ClientError::Parse(msg) => {
                ReconcileError::Transport(format!("invalid response: {}", msg))
            }
            ClientError::Auth { status, message } => ReconcileError::Auth { status, message },
            ClientError::Api {
                status,
                code,
                message,
            } => ReconcileError::Api {
                status,
                code,
                message,
            },
        }
    }
}

impl From<PollError> for ReconcileError {
    fn from(e: PollError) -> Self {
        match e {
            PollError::Timeout { what, elapsed } => {
                ReconcileError::ConvergenceTimeout { what, elapsed }
            }
            PollError::Cancelled(what) => ReconcileError::Cancelled(what),
            PollError::Client(e) => e.into(),
        }
    }
}

/// Step of a reconciliation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validate,
    Create,
    Start,
    Edit,
    LibraryInstall,
    LibraryUninstall,
    Delete,
    Read,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Create => "create",
            Stage::Start => "start",
            Stage::Edit => "edit",
            Stage::LibraryInstall => "library-install",
            Stage::LibraryUninstall => "library-uninstall",
            Stage::Delete => "delete",
            Stage::Read => "read",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified error together with the step it happened in
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error} (stage: {stage})")]
pub struct ReconcileFailure {
    pub stage: Stage,
    pub error: ReconcileError,
}

impl ReconcileFailure {
    pub fn new(stage: Stage, error: impl Into<ReconcileError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{InstallStatus, LibrarySpec};

    #[test]
    fn test_api_error_message_is_verbatim() {
        let failure = ReconcileFailure::new(
            Stage::Create,
            ClientError::api(400, "INVALID_REQUEST", "Internal error happened"),
        );
        assert!(failure.to_string().starts_with("Internal error happened"));
        assert_eq!(failure.error.code(), Some("INVALID_REQUEST"));
        assert!(!failure.error.is_not_found());
    }

    #[test]
    fn test_not_found_survives_conversion() {
        let err = ReconcileError::from(ClientError::not_found("Cluster abc does not exist"));
        assert!(err.is_not_found());
        assert!(ReconcileError::from(ClientError::api(400, "NOT_FOUND", "gone")).is_not_found());
    }

    #[test]
    fn test_client_error_classification() {
        assert!(matches!(
            ReconcileError::from(ClientError::Transport("reset".to_string())),
            ReconcileError::Transport(_)
        ));
        assert!(matches!(
            ReconcileError::from(ClientError::Parse("eof".to_string())),
            ReconcileError::Transport(_)
        ));
        assert!(matches!(
            ReconcileError::from(ClientError::Auth {
                status: 401,
                message: "bad token".to_string()
            }),
            ReconcileError::Auth { status: 401, .. }
        ));
    }

    #[test]
    fn test_poll_error_classification() {
        let timeout = ReconcileError::from(PollError::Timeout {
            what: "cluster running".to_string(),
            elapsed: Duration::from_secs(5),
        });
        assert!(matches!(timeout, ReconcileError::ConvergenceTimeout { .. }));

        let cancelled = ReconcileError::from(PollError::Cancelled("x".to_string()));
        assert_eq!(cancelled, ReconcileError::Cancelled("x".to_string()));
    }

    #[test]
    fn test_partial_convergence_lists_failures() {
        let mut failed = LibraryStatus::new(LibrarySpec::pypi("broken"), InstallStatus::Failed);
        failed.messages = vec!["no matching distribution".to_string()];
        let err = ReconcileError::PartialConvergence {
            failed: vec![failed],
        };
        assert_eq!(
            err.to_string(),
            "1 libraries failed to install: pypi:broken (FAILED: no matching distribution)"
        );
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::LibraryUninstall.to_string(), "library-uninstall");
        assert_eq!(Stage::Validate.to_string(), "validate");
    }
}
