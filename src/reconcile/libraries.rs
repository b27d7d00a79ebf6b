//! Library convergence loop
//!
//! Each round diffs desired against observed libraries, uninstalls the
//! leftovers, installs what is missing or failed, then waits for the
//! control plane to settle. Failed installs are resubmitted until their
//! attempt budget runs out.

use tracing::{debug, info, warn};

use super::{ReconcileError, ReconcileFailure, Run, Stage, Step};
use crate::client::ClientError;
use crate::cluster::Action;
use crate::library::{
    diff_libraries, is_converged, InstallAttempts, InstallStatus, LibrarySpec, LibraryStatus,
};
use crate::poll::{poll_until, Check};

/// Observed libraries have stopped moving.
///
/// Every desired library that is reported, and every library in
/// `submitted`, must be out of its in-flight states. Every library in
/// `removing` must be gone or scheduled for uninstall.
pub fn is_settled(
    desired: &[LibrarySpec],
    submitted: &[LibrarySpec],
    removing: &[LibrarySpec],
    observed: &[LibraryStatus],
) -> bool {
    let status_of = |library: &LibrarySpec| {
        observed
            .iter()
            .find(|s| &s.library == library)
            .map(|s| s.status)
    };

    let submitted_done = submitted
        .iter()
        .all(|l| matches!(status_of(l), Some(status) if !status.is_in_flight()));
    let desired_done = desired
        .iter()
        .all(|l| status_of(l).map_or(true, |status| !status.is_in_flight()));
    let removed = removing.iter().all(|l| {
        status_of(l).map_or(true, |status| status == InstallStatus::UninstallOnRestart)
    });

    submitted_done && desired_done && removed
}

/// Statuses for libraries that ran out of attempts; unreported ones are
/// listed as failed
fn exhausted_statuses(exhausted: &[LibrarySpec], observed: &[LibraryStatus]) -> Vec<LibraryStatus> {
    exhausted
        .iter()
        .map(|library| {
            observed
                .iter()
                .find(|s| &s.library == library)
                .cloned()
                .unwrap_or_else(|| {
                    let mut status = LibraryStatus::new(library.clone(), InstallStatus::Failed);
                    status.messages = vec!["not reported by the control plane".to_string()];
                    status
                })
        })
        .collect()
}

impl Run<'_> {
    /// Drive the library set on a running cluster to `desired`
    pub(super) async fn converge_libraries(
        &mut self,
        cluster_id: &str,
        desired: &[LibrarySpec],
        mut observed: Vec<LibraryStatus>,
        attempts: &mut InstallAttempts,
    ) -> Step {
        let mut removing: Vec<LibrarySpec> = Vec::new();

        loop {
            let mut diff = diff_libraries(desired, &observed, attempts);
            diff.uninstall.retain(|l| !removing.contains(l));

            if diff.is_empty() {
                if is_converged(desired, &observed) {
                    info!(cluster_id, libraries = desired.len(), "libraries converged");
                    return Ok(());
                }
                if !diff.exhausted.is_empty() && is_settled(desired, &[], &removing, &observed) {
                    let failed = exhausted_statuses(&diff.exhausted, &observed);
                    for status in &failed {
                        warn!(cluster_id, library = %status.library, messages = ?status.messages, "library install gave up");
                    }
                    return Err(ReconcileFailure::new(
                        Stage::LibraryInstall,
                        ReconcileError::PartialConvergence { failed },
                    ));
                }
            }

            if !diff.uninstall.is_empty() {
                info!(cluster_id, count = diff.uninstall.len(), "uninstalling libraries");
                let client = self.client;
                self.mutate(
                    cluster_id,
                    Action::UninstallLibraries,
                    Stage::LibraryUninstall,
                    client.uninstall_libraries(cluster_id, &diff.uninstall),
                )
                .await?;
                removing.extend(diff.uninstall.iter().cloned());
            }

            if !diff.install.is_empty() {
                for library in diff.install.iter().filter(|l| attempts.used(l) > 0) {
                    warn!(
                        cluster_id,
                        %library,
                        attempt = attempts.used(library) + 1,
                        budget = attempts.budget(),
                        "resubmitting failed library"
                    );
                }
                info!(cluster_id, count = diff.install.len(), "installing libraries");
                let client = self.client;
                self.mutate(
                    cluster_id,
                    Action::InstallLibraries,
                    Stage::LibraryInstall,
                    client.install_libraries(cluster_id, &diff.install),
                )
                .await?;
                attempts.record(&diff.install);
            }

            let stage = if diff.install.is_empty() && !diff.uninstall.is_empty() {
                Stage::LibraryUninstall
            } else {
                Stage::LibraryInstall
            };
            observed = self
                .wait_libraries(cluster_id, desired, &diff.install, &removing, stage)
                .await?;
        }
    }

    async fn wait_libraries(
        &mut self,
        cluster_id: &str,
        desired: &[LibrarySpec],
        submitted: &[LibrarySpec],
        removing: &[LibrarySpec],
        stage: Stage,
    ) -> Step<Vec<LibraryStatus>> {
        let client = self.client;
        let last = &mut self.libraries;
        let what = format!("libraries on cluster {}", cluster_id);

        poll_until(
            &self.options.poll,
            self.cancel,
            &what,
            || client.library_statuses(cluster_id),
            |observed: Result<Vec<LibraryStatus>, ClientError>| -> Result<_, ReconcileError> {
                let observed = observed?;
                *last = observed.clone();
                if is_settled(desired, submitted, removing, &observed) {
                    Ok(Check::Done(observed))
                } else {
                    debug!(cluster_id, libraries = observed.len(), "libraries still in flight");
                    Ok(Check::Continue)
                }
            },
        )
        .await
        .map_err(|e| ReconcileFailure::new(stage, e))
    }
}
