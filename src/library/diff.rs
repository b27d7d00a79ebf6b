//! Library set differ
//!
//! Computes the install and uninstall sets that move an observed library set
//! towards a desired one. Pure functions only; the reconciler owns the I/O.

use std::collections::{HashMap, HashSet};

use super::{InstallStatus, LibrarySpec, LibraryStatus};

/// Per-library install submissions, bounded by a budget
#[derive(Debug, Clone)]
pub struct InstallAttempts {
    budget: u32,
    used: HashMap<LibrarySpec, u32>,
}

impl InstallAttempts {
    /// A budget of zero still allows the initial install
    pub fn new(budget: u32) -> Self {
        Self {
            budget: budget.max(1),
            used: HashMap::new(),
        }
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Submissions recorded so far for `library`
    pub fn used(&self, library: &LibrarySpec) -> u32 {
        self.used.get(library).copied().unwrap_or(0)
    }

    /// Whether `library` may be submitted again
    pub fn can_attempt(&self, library: &LibrarySpec) -> bool {
        self.used(library) < self.budget
    }

    /// Count one submission for each library
    pub fn record(&mut self, libraries: &[LibrarySpec]) {
        for library in libraries {
            *self.used.entry(library.clone()).or_insert(0) += 1;
        }
    }
}

/// Delta between desired and observed libraries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryDiff {
    /// Libraries to install, in desired declaration order
    pub install: Vec<LibrarySpec>,
    /// Libraries to uninstall, in observed order
    pub uninstall: Vec<LibrarySpec>,
    /// Desired libraries that need installing but have no attempts left
    pub exhausted: Vec<LibrarySpec>,
}

impl LibraryDiff {
    /// No mutating call is needed
    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.uninstall.is_empty()
    }
}

/// Compute the library delta.
///
/// A desired library goes to the install set when it is absent, failed,
/// skipped, or scheduled for uninstall, as long as `attempts` allows
/// another submission; otherwise it is reported as exhausted. An observed
/// library that is not desired goes to the uninstall set unless it is
/// already scheduled for uninstall or is attached to all clusters.
pub fn diff_libraries(
    desired: &[LibrarySpec],
    observed: &[LibraryStatus],
    attempts: &InstallAttempts,
) -> LibraryDiff {
    let index: HashMap<&LibrarySpec, InstallStatus> = observed
        .iter()
        .map(|s| (&s.library, s.status))
        .collect();

    let mut diff = LibraryDiff::default();
    let mut seen: HashSet<&LibrarySpec> = HashSet::new();

    for library in desired {
        if !seen.insert(library) {
            continue;
        }

        let needs_install = match index.get(library) {
            None => true,
            Some(status) => status.is_failed() || *status == InstallStatus::UninstallOnRestart,
        };
        if !needs_install {
            continue;
        }

        if attempts.can_attempt(library) {
            diff.install.push(library.clone());
        } else {
            diff.exhausted.push(library.clone());
        }
    }

    for status in observed {
        if seen.contains(&status.library)
            || status.is_library_for_all_clusters
            || status.status == InstallStatus::UninstallOnRestart
        {
            continue;
        }
        if !diff.uninstall.contains(&status.library) {
            diff.uninstall.push(status.library.clone());
        }
    }

    diff
}

/// Observed state matches desired: every desired library is installed and
/// every other library is gone or scheduled for uninstall
pub fn is_converged(desired: &[LibrarySpec], observed: &[LibraryStatus]) -> bool {
    let all_installed = desired.iter().all(|library| {
        observed
            .iter()
            .any(|s| &s.library == library && s.status == InstallStatus::Installed)
    });

    let no_leftovers = observed.iter().all(|s| {
        desired.contains(&s.library)
            || s.is_library_for_all_clusters
            || s.status == InstallStatus::UninstallOnRestart
    });

    all_installed && no_leftovers
}
