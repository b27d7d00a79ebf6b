//! Cluster lifecycle phases and the actions each phase permits
//!
//! ```text
//!   Pending ──► Running ──► Terminating ──► Terminated
//!      ▲                                        │
//!      └──────────────── start ─────────────────┘
//!
//!   Error / Unknown: reachable from any phase
//! ```
//!
//! Only `Running` allows shape edits and library changes. Transitional
//! phases allow nothing but waiting. `Unknown` is waited out, except that a
//! terminate request is always accepted.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse lifecycle state of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Phase {
    Pending,
    Running,
    Terminating,
    Terminated,
    Error,
    #[default]
    Unknown,
}

/// A control-plane call the reconciler may issue, or waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Start,
    Edit,
    Delete,
    PermanentDelete,
    InstallLibraries,
    UninstallLibraries,
    Wait,
}

impl Phase {
    /// Map a remote status string onto a phase.
    ///
    /// Restarting and resizing clusters are mid-transition and reject
    /// mutations, so they are treated as pending.
    pub fn from_status(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "PENDING" | "RESTARTING" | "RESIZING" => Phase::Pending,
            "RUNNING" => Phase::Running,
            "TERMINATING" => Phase::Terminating,
            "TERMINATED" => Phase::Terminated,
            "ERROR" => Phase::Error,
            _ => Phase::Unknown,
        }
    }

    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "PENDING",
            Phase::Running => "RUNNING",
            Phase::Terminating => "TERMINATING",
            Phase::Terminated => "TERMINATED",
            Phase::Error => "ERROR",
            Phase::Unknown => "UNKNOWN",
        }
    }

    /// A phase the cluster will leave without outside intervention
    pub fn is_transitional(&self) -> bool {
        matches!(self, Phase::Pending | Phase::Terminating)
    }

    /// A phase to wait out before deciding on the next mutation
    pub fn is_settling(&self) -> bool {
        matches!(self, Phase::Pending | Phase::Terminating | Phase::Unknown)
    }

    /// A phase that will not become `Running` by waiting
    pub fn is_failed(&self) -> bool {
        matches!(self, Phase::Error | Phase::Unknown)
    }

    /// Actions the control plane accepts in this phase
    pub fn next_legal_actions(&self) -> &'static [Action] {
        match self {
            Phase::Running => &[
                Action::Edit,
                Action::Delete,
                Action::InstallLibraries,
                Action::UninstallLibraries,
            ],
            Phase::Terminated => &[Action::Start, Action::Delete, Action::PermanentDelete],
            Phase::Error => &[Action::Delete, Action::PermanentDelete],
            Phase::Unknown => &[Action::Wait, Action::Delete],
            Phase::Pending | Phase::Terminating => &[Action::Wait],
        }
    }

    /// Whether `action` may be issued in this phase
    pub fn permits(&self, action: Action) -> bool {
        self.next_legal_actions().contains(&action)
    }
}

impl From<String> for Phase {
    fn from(s: String) -> Self {
        Phase::from_status(&s)
    }
}

impl From<Phase> for String {
    fn from(phase: Phase) -> Self {
        phase.as_str().to_string()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Start => "start",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::PermanentDelete => "permanent-delete",
            Action::InstallLibraries => "install-libraries",
            Action::UninstallLibraries => "uninstall-libraries",
            Action::Wait => "wait",
        };
        f.write_str(name)
    }
}
