//! Manifest lint hints
//!
//! Validation on load rejects manifests the control plane cannot accept.
//! Lints go further and flag manifests that are accepted but probably not
//! what the author meant: clusters that never shut down, floating library
//! versions, duplicate entries.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::cluster::Sizing;
use crate::library::LibrarySpec;
use crate::reconcile::DesiredState;

/// Lint severity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational hint
    Info,
    /// Warning - will apply but may not behave as intended
    Warning,
    /// Error - likely to fail once applied
    Error,
}

/// A single lint message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintMessage {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// All lint messages for one manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintReport {
    pub messages: Vec<LintMessage>,
    pub passed: bool,
}

impl Default for LintReport {
    fn default() -> Self {
        Self::new()
    }
}

impl LintReport {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            passed: true,
        }
    }

    pub fn add(&mut self, msg: LintMessage) {
        if msg.severity == Severity::Error {
            self.passed = false;
        }
        self.messages.push(msg);
    }

    pub fn info(mut self, code: &str, message: &str) -> Self {
        self.add(LintMessage {
            severity: Severity::Info,
            code: code.to_string(),
            message: message.to_string(),
            suggestion: None,
        });
        self
    }

    pub fn warning(mut self, code: &str, message: &str, suggestion: Option<&str>) -> Self {
        self.add(LintMessage {
            severity: Severity::Warning,
            code: code.to_string(),
            message: message.to_string(),
            suggestion: suggestion.map(String::from),
        });
        self
    }

    pub fn error(mut self, code: &str, message: &str, suggestion: Option<&str>) -> Self {
        self.add(LintMessage {
            severity: Severity::Error,
            code: code.to_string(),
            message: message.to_string(),
            suggestion: suggestion.map(String::from),
        });
        self
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.severity == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.messages.iter().any(|m| m.severity == Severity::Warning)
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.messages.iter().any(|m| m.code == code)
    }
}

// ============================================================================
// SBIO: Pure lint logic (no I/O)
// ============================================================================

/// A pypi requirement that names an exact version
fn is_pinned(package: &str) -> bool {
    package.contains("==") || package.contains('@')
}

/// Lint a manifest that already passed validation
pub fn lint_manifest(desired: &DesiredState) -> LintReport {
    let mut report = LintReport::new();
    let cluster = &desired.cluster;

    if cluster.cluster_name.trim().is_empty() {
        report = report.warning(
            "UNNAMED_CLUSTER",
            "cluster_name is empty",
            Some("Name the cluster so it can be found in the workspace"),
        );
    }

    if cluster.autotermination_minutes == 0 {
        report = report.warning(
            "AUTOTERMINATION_DISABLED",
            "autotermination_minutes is 0; the cluster runs until deleted",
            Some("Set autotermination_minutes to 10 or more"),
        );
    }

    match cluster.sizing {
        Sizing::Autoscale(range) if range.max_workers == 0 => {
            report = report.error(
                "AUTOSCALE_EMPTY",
                "autoscale max_workers is 0",
                Some("Use num_workers: 0 for a driver-only cluster"),
            );
        }
        Sizing::Autoscale(range) if range.min_workers == range.max_workers => {
            report = report.info(
                "AUTOSCALE_FIXED_RANGE",
                &format!(
                    "autoscale range {0}-{0} never scales; num_workers: {0} is equivalent",
                    range.min_workers
                ),
            );
        }
        Sizing::Fixed(0) => {
            report = report.info(
                "DRIVER_ONLY",
                "num_workers is 0; all work runs on the driver",
            );
        }
        _ => {}
    }

    if cluster.instance_pool_id.is_some() && cluster.node_type_id.is_some() {
        report = report.warning(
            "POOL_AND_NODE_TYPE",
            "instance_pool_id and node_type_id are both set; the pool decides the node type",
            Some("Drop node_type_id when using an instance pool"),
        );
    }

    let mut seen = HashSet::new();
    for library in &desired.libraries {
        if !seen.insert(library) {
            report = report.warning(
                "DUPLICATE_LIBRARY",
                &format!("{} is listed more than once", library),
                Some("Remove the duplicate entry"),
            );
        }

        match library {
            LibrarySpec::Pypi(pypi) if !is_pinned(&pypi.package) => {
                report = report.warning(
                    "UNPINNED_PYPI",
                    &format!("pypi package '{}' has no version pin", pypi.package),
                    Some("Pin a version, e.g. package==1.2.3"),
                );
            }
            LibrarySpec::Maven(maven) if maven.coordinates.ends_with("-SNAPSHOT") => {
                report = report.warning(
                    "MAVEN_SNAPSHOT",
                    &format!("maven artifact '{}' is a snapshot", maven.coordinates),
                    Some("Use a released version"),
                );
            }
            LibrarySpec::Cran(cran) => {
                report = report.info(
                    "CRAN_UNPINNED",
                    &format!("cran package '{}' installs the latest version", cran.package),
                );
            }
            _ => {}
        }
    }

    report
}

/// Format a lint report for display
pub fn format_lint_report(report: &LintReport) -> String {
    let mut output = String::new();

    for msg in &report.messages {
        let prefix = match msg.severity {
            Severity::Info => "INFO",
            Severity::Warning => "WARN",
            Severity::Error => "ERROR",
        };

        output.push_str(&format!("  {} [{}]: {}\n", prefix, msg.code, msg.message));

        if let Some(suggestion) = &msg.suggestion {
            output.push_str(&format!("    -> {}\n", suggestion));
        }
    }

    output
}
