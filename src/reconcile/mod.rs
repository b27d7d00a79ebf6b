//! Reconciler - converges a remote cluster and its libraries to a desired state
//!
//! ```text
//!   create:  validate → create → wait running → libraries
//!   update:  validate → read → [wait stable] → [start → wait running]
//!            → [edit → wait running] → libraries
//!   delete:  read → [wait stable] → delete → wait terminated → permanent-delete
//! ```
//!
//! Every mutating call is preceded by a legality check against the last
//! observed phase. A call the phase does not permit is never issued; the
//! reconciliation ends with [`ReconcileError::InvalidPhase`] instead.
//!
//! A reconciliation is one sequential async flow. Callers must not run two
//! reconciliations for the same cluster at once; the engine holds no lock.

mod error;
mod libraries;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ClientError, ControlPlane};
use crate::cluster::{Action, ClusterInfo, ClusterSpec, Phase};
use crate::library::{diff_libraries, InstallAttempts, LibrarySpec, LibraryStatus};
use crate::poll::{poll_until, Check, PollConfig};

pub use error::{ReconcileError, ReconcileFailure, Stage};
pub use libraries::is_settled;

/// Default number of install submissions per library
pub const DEFAULT_LIBRARY_ATTEMPT_BUDGET: u32 = 3;

// ============================================================================
// Inputs and outputs
// ============================================================================

/// Desired cluster shape plus the libraries that must be on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredState {
    #[serde(flatten)]
    pub cluster: ClusterSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<LibrarySpec>,
}

impl DesiredState {
    pub fn new(cluster: ClusterSpec) -> Self {
        Self {
            cluster,
            libraries: Vec::new(),
        }
    }

    pub fn with_library(mut self, library: LibrarySpec) -> Self {
        self.libraries.push(library);
        self
    }

    pub fn with_libraries(mut self, libraries: impl IntoIterator<Item = LibrarySpec>) -> Self {
        self.libraries.extend(libraries);
        self
    }

    /// Check cluster and library invariants
    pub fn validate(&self) -> Result<(), ReconcileError> {
        self.cluster.validate()?;
        for library in &self.libraries {
            library.validate()?;
        }
        Ok(())
    }
}

/// Knobs for one reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Install submissions allowed per library (0 behaves like 1)
    pub library_attempt_budget: u32,
    /// Timing of every wait
    pub poll: PollConfig,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            library_attempt_budget: DEFAULT_LIBRARY_ATTEMPT_BUDGET,
            poll: PollConfig::default(),
        }
    }
}

impl ReconcileOptions {
    pub fn with_attempt_budget(mut self, budget: u32) -> Self {
        self.library_attempt_budget = budget;
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.poll.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: std::time::Duration) -> Self {
        self.poll.interval = interval;
        self.poll.max_interval = self.poll.max_interval.max(interval);
        self
    }
}

/// What a reconciliation set out to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Outcome of a reconciliation, successful or not
#[derive(Debug, Clone)]
pub struct ReconciliationResult {
    pub operation: Operation,
    /// Last observed cluster state, if any was observed
    pub cluster: Option<ClusterInfo>,
    /// Last observed library statuses
    pub libraries: Vec<LibraryStatus>,
    /// Mutating calls issued, in order
    pub actions: Vec<Action>,
    pub outcome: Result<(), ReconcileFailure>,
}

impl ReconciliationResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Identifier of the cluster, once the control plane assigned one
    pub fn cluster_id(&self) -> Option<&str> {
        self.cluster
            .as_ref()
            .map(|c| c.cluster_id.as_str())
            .filter(|id| !id.is_empty())
    }

    pub fn failure(&self) -> Option<&ReconcileFailure> {
        self.outcome.as_ref().err()
    }

    /// True when an update or delete found nothing to change
    pub fn is_noop(&self) -> bool {
        self.is_success() && self.operation != Operation::Create && self.actions.is_empty()
    }
}

/// Observed state returned by [`Reconciler::read`]
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedCluster {
    pub info: ClusterInfo,
    pub libraries: Vec<LibraryStatus>,
}

// ============================================================================
// Reconciler
// ============================================================================

/// Drives a [`ControlPlane`] towards desired states
#[derive(Clone)]
pub struct Reconciler {
    client: Arc<dyn ControlPlane>,
}

impl Reconciler {
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self { client }
    }

    /// Create the cluster when `existing_id` is `None`, otherwise update it
    pub async fn reconcile(
        &self,
        desired: &DesiredState,
        existing_id: Option<&str>,
        options: &ReconcileOptions,
        cancel: &CancellationToken,
    ) -> ReconciliationResult {
        let operation = match existing_id {
            Some(_) => Operation::Update,
            None => Operation::Create,
        };
        let mut run = Run::new(self.client.as_ref(), options, cancel);

        let outcome = match existing_id {
            None => run.create(desired).await,
            Some(id) => run.update(id, desired).await,
        };
        run.finish(operation, outcome)
    }

    /// Terminate and purge a cluster; an absent cluster counts as deleted
    pub async fn delete(
        &self,
        cluster_id: &str,
        options: &ReconcileOptions,
        cancel: &CancellationToken,
    ) -> ReconciliationResult {
        let mut run = Run::new(self.client.as_ref(), options, cancel);
        let outcome = run.delete(cluster_id).await;
        run.finish(Operation::Delete, outcome)
    }

    /// Fetch observed state without changing anything; `None` when the
    /// cluster no longer exists
    pub async fn read(
        &self,
        cluster_id: &str,
    ) -> Result<Option<ObservedCluster>, ReconcileFailure> {
        let info = match self.client.get_cluster(cluster_id).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(ReconcileFailure::new(Stage::Read, e)),
        };
        let libraries = match self.client.library_statuses(cluster_id).await {
            Ok(libraries) => libraries,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(ReconcileFailure::new(Stage::Read, e)),
        };
        Ok(Some(ObservedCluster { info, libraries }))
    }
}

// ============================================================================
// One reconciliation
// ============================================================================

/// Call-local state of one reconciliation
struct Run<'a> {
    client: &'a dyn ControlPlane,
    options: &'a ReconcileOptions,
    cancel: &'a CancellationToken,
    cluster: Option<ClusterInfo>,
    libraries: Vec<LibraryStatus>,
    actions: Vec<Action>,
}

type Step<T = ()> = Result<T, ReconcileFailure>;

impl<'a> Run<'a> {
    fn new(
        client: &'a dyn ControlPlane,
        options: &'a ReconcileOptions,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            client,
            options,
            cancel,
            cluster: None,
            libraries: Vec::new(),
            actions: Vec::new(),
        }
    }

    fn finish(self, operation: Operation, outcome: Step) -> ReconciliationResult {
        match &outcome {
            Ok(()) => info!(%operation, actions = self.actions.len(), "reconciliation complete"),
            Err(failure) => warn!(
                %operation,
                stage = %failure.stage,
                error = %failure.error,
                "reconciliation failed"
            ),
        }
        ReconciliationResult {
            operation,
            cluster: self.cluster,
            libraries: self.libraries,
            actions: self.actions,
            outcome,
        }
    }

    fn phase(&self) -> Phase {
        self.cluster.as_ref().map(|c| c.state).unwrap_or_default()
    }

    /// Stop before the next remote call once cancellation was requested
    fn checkpoint(&self, stage: Stage) -> Step {
        if self.cancel.is_cancelled() {
            return Err(ReconcileFailure::new(
                stage,
                ReconcileError::Cancelled(stage.to_string()),
            ));
        }
        Ok(())
    }

    /// Refuse `action` unless the last observed phase permits it
    fn require(&self, cluster_id: &str, action: Action, stage: Stage) -> Step {
        let phase = self.phase();
        if !phase.permits(action) {
            return Err(ReconcileFailure::new(
                stage,
                ReconcileError::InvalidPhase {
                    cluster_id: cluster_id.to_string(),
                    phase,
                    action,
                },
            ));
        }
        Ok(())
    }

    /// Legality check, cancellation check, then the call itself
    async fn mutate<F>(
        &mut self,
        cluster_id: &str,
        action: Action,
        stage: Stage,
        call: F,
    ) -> Step
    where
        F: std::future::Future<Output = Result<(), ClientError>>,
    {
        self.require(cluster_id, action, stage)?;
        self.checkpoint(stage)?;
        info!(cluster_id, %action, "issuing");
        call.await.map_err(|e| ReconcileFailure::new(stage, e))?;
        self.actions.push(action);
        Ok(())
    }

    async fn fetch_cluster(&mut self, cluster_id: &str, stage: Stage) -> Step<ClusterInfo> {
        self.checkpoint(stage)?;
        let info = self
            .client
            .get_cluster(cluster_id)
            .await
            .map_err(|e| ReconcileFailure::new(stage, e))?;
        self.cluster = Some(info.clone());
        Ok(info)
    }

    async fn fetch_libraries(
        &mut self,
        cluster_id: &str,
        stage: Stage,
    ) -> Step<Vec<LibraryStatus>> {
        self.checkpoint(stage)?;
        let observed = self
            .client
            .library_statuses(cluster_id)
            .await
            .map_err(|e| ReconcileFailure::new(stage, e))?;
        self.libraries = observed.clone();
        Ok(observed)
    }

    // ------------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------------

    async fn create(&mut self, desired: &DesiredState) -> Step {
        desired
            .validate()
            .map_err(|e| ReconcileFailure::new(Stage::Validate, e))?;

        self.checkpoint(Stage::Create)?;
        info!(
            name = %desired.cluster.cluster_name,
            spark_version = %desired.cluster.spark_version,
            "creating cluster"
        );
        let cluster_id = self
            .client
            .create_cluster(&desired.cluster)
            .await
            .map_err(|e| ReconcileFailure::new(Stage::Create, e))?;
        info!(cluster_id = %cluster_id, "cluster created");

        self.cluster = Some(ClusterInfo {
            cluster_id: cluster_id.clone(),
            state: Phase::Pending,
            ..Default::default()
        });

        self.wait_running(&cluster_id, Stage::Create).await?;

        if !desired.libraries.is_empty() {
            let mut attempts = InstallAttempts::new(self.options.library_attempt_budget);
            self.converge_libraries(&cluster_id, &desired.libraries, Vec::new(), &mut attempts)
                .await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------------

    async fn update(&mut self, cluster_id: &str, desired: &DesiredState) -> Step {
        desired
            .validate()
            .map_err(|e| ReconcileFailure::new(Stage::Validate, e))?;

        let mut info = self.fetch_cluster(cluster_id, Stage::Read).await?;
        if info.state.is_settling() {
            info = self.wait_stable(cluster_id, Stage::Read).await?;
        }

        if info.state.is_failed() {
            return Err(ReconcileFailure::new(
                Stage::Start,
                ReconcileError::InvalidPhase {
                    cluster_id: cluster_id.to_string(),
                    phase: info.state,
                    action: Action::Start,
                },
            ));
        }

        let mut observed = self.fetch_libraries(cluster_id, Stage::Read).await?;
        let mut attempts = InstallAttempts::new(self.options.library_attempt_budget);

        let shape_changes = desired.cluster.shape_diff(&info);
        let library_delta = diff_libraries(&desired.libraries, &observed, &attempts);
        let needs_running = !shape_changes.is_empty() || !library_delta.is_empty();

        if !needs_running {
            debug!(cluster_id, state = %info.state, "no shape or library changes");
        }

        if needs_running && info.state == Phase::Terminated {
            info!(cluster_id, "starting terminated cluster to apply changes");
            let client = self.client;
            self.mutate(
                cluster_id,
                Action::Start,
                Stage::Start,
                client.start_cluster(cluster_id),
            )
            .await?;
            self.wait_running(cluster_id, Stage::Start).await?;
        }

        if !shape_changes.is_empty() {
            info!(cluster_id, fields = ?shape_changes, "editing cluster shape");
            let client = self.client;
            self.mutate(
                cluster_id,
                Action::Edit,
                Stage::Edit,
                client.edit_cluster(cluster_id, &desired.cluster),
            )
            .await?;
            self.wait_running(cluster_id, Stage::Edit).await?;
        }

        // library statuses of a terminated cluster only resolve after a start
        if self.phase() == Phase::Running {
            if !self.actions.is_empty() {
                observed = self.fetch_libraries(cluster_id, Stage::LibraryInstall).await?;
            }
            self.converge_libraries(cluster_id, &desired.libraries, observed, &mut attempts)
                .await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------------

    async fn delete(&mut self, cluster_id: &str) -> Step {
        match self.delete_inner(cluster_id).await {
            Err(failure) if failure.error.is_not_found() => {
                info!(cluster_id, "cluster already gone");
                Ok(())
            }
            other => other,
        }
    }

    async fn delete_inner(&mut self, cluster_id: &str) -> Step {
        let mut info = self.fetch_cluster(cluster_id, Stage::Delete).await?;
        if info.state.is_transitional() {
            info = self.wait_stable(cluster_id, Stage::Delete).await?;
        }

        if !matches!(info.state, Phase::Terminated | Phase::Error) {
            let client = self.client;
            self.mutate(
                cluster_id,
                Action::Delete,
                Stage::Delete,
                client.delete_cluster(cluster_id),
            )
            .await?;
            if !self.wait_terminated(cluster_id).await? {
                info!(cluster_id, "cluster disappeared while terminating");
                return Ok(());
            }
        }

        let client = self.client;
        self.mutate(
            cluster_id,
            Action::PermanentDelete,
            Stage::Delete,
            client.permanent_delete_cluster(cluster_id),
        )
        .await?;
        info!(cluster_id, "cluster permanently deleted");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Waits
    // ------------------------------------------------------------------------

    /// Poll until the cluster is `Running`. Error, unknown, terminated or
    /// missing clusters end the wait with `ClusterFailed`.
    async fn wait_running(&mut self, cluster_id: &str, stage: Stage) -> Step<ClusterInfo> {
        let client = self.client;
        let last = &mut self.cluster;
        let what = format!("cluster {} to be running", cluster_id);

        poll_until(
            &self.options.poll,
            self.cancel,
            &what,
            || client.get_cluster(cluster_id),
            |observed| match observed {
                Ok(info) => {
                    debug!(cluster_id, state = %info.state, "observed");
                    *last = Some(info.clone());
                    match info.state {
                        Phase::Running => Ok(Check::Done(info)),
                        Phase::Pending | Phase::Terminating => Ok(Check::Continue),
                        phase => Err(ReconcileError::ClusterFailed {
                            cluster_id: cluster_id.to_string(),
                            phase,
                            message: info.state_message,
                        }),
                    }
                }
                Err(e) if e.is_not_found() => Err(ReconcileError::ClusterFailed {
                    cluster_id: cluster_id.to_string(),
                    phase: Phase::Unknown,
                    message: "cluster disappeared".to_string(),
                }),
                Err(e) => Err(e.into()),
            },
        )
        .await
        .map_err(|e| ReconcileFailure::new(stage, e))
    }

    /// Poll until the cluster leaves `Pending`, `Terminating` or `Unknown`
    async fn wait_stable(&mut self, cluster_id: &str, stage: Stage) -> Step<ClusterInfo> {
        let client = self.client;
        let last = &mut self.cluster;
        let what = format!("cluster {} to settle", cluster_id);

        poll_until(
            &self.options.poll,
            self.cancel,
            &what,
            || client.get_cluster(cluster_id),
            |observed: Result<ClusterInfo, ClientError>| -> Result<_, ReconcileError> {
                let info = observed?;
                debug!(cluster_id, state = %info.state, "observed");
                *last = Some(info.clone());
                if info.state.is_settling() {
                    Ok(Check::Continue)
                } else {
                    Ok(Check::Done(info))
                }
            },
        )
        .await
        .map_err(|e| ReconcileFailure::new(stage, e))
    }

    /// Poll until the cluster is `Terminated`; `false` when it vanished
    async fn wait_terminated(&mut self, cluster_id: &str) -> Step<bool> {
        let client = self.client;
        let last = &mut self.cluster;
        let what = format!("cluster {} to terminate", cluster_id);

        poll_until(
            &self.options.poll,
            self.cancel,
            &what,
            || client.get_cluster(cluster_id),
            |observed| match observed {
                Ok(info) => {
                    debug!(cluster_id, state = %info.state, "observed");
                    let done = matches!(info.state, Phase::Terminated | Phase::Error);
                    *last = Some(info);
                    Ok(if done { Check::Done(true) } else { Check::Continue })
                }
                Err(e) if e.is_not_found() => Ok(Check::Done(false)),
                Err(e) => Err(ReconcileError::from(e)),
            },
        )
        .await
        .map_err(|e| ReconcileFailure::new(Stage::Delete, e))
    }
}
