//! In-memory control plane for tests (no I/O)
//!
//! Simulates the lifecycle the real control plane exhibits: mutations move a
//! cluster through a transitional phase for a configurable number of polls,
//! and calls that the real API would reject for the current phase are
//! rejected with `INVALID_STATE`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ClientError, ControlPlane};
use crate::cluster::{ClusterInfo, ClusterShape, ClusterSpec, Phase};
use crate::library::{InstallStatus, LibrarySpec, LibraryStatus};

/// A recorded call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create,
    Get(String),
    Start(String),
    Edit(String),
    Delete(String),
    PermanentDelete(String),
    LibraryStatuses(String),
    Install(String, Vec<LibrarySpec>),
    Uninstall(String, Vec<LibrarySpec>),
}

impl Call {
    /// True for calls that change remote state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Call::Get(_) | Call::LibraryStatuses(_))
    }
}

struct MockLibrary {
    status: LibraryStatus,
    settles_to: InstallStatus,
    polls_left: u32,
}

struct MockCluster {
    info: ClusterInfo,
    target: Phase,
    polls_left: u32,
    libraries: Vec<MockLibrary>,
}

#[derive(Default)]
struct State {
    clusters: HashMap<String, MockCluster>,
    calls: Vec<Call>,
    injected: HashMap<&'static str, VecDeque<Option<ClientError>>>,
    failing_installs: HashMap<LibrarySpec, u32>,
    next_id: u32,
}

pub struct MockControlPlane {
    state: Mutex<State>,
    transition_polls: u32,
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl MockControlPlane {
    /// Transitions settle after one observation
    pub fn new() -> Self {
        Self::with_transition_polls(1)
    }

    /// Transitions settle after `polls` observations of the transitional state
    pub fn with_transition_polls(polls: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            transition_polls: polls,
        }
    }

    /// Seed an existing cluster
    pub fn insert_cluster(&self, info: ClusterInfo, libraries: Vec<LibraryStatus>) {
        let mut state = self.state.lock().unwrap();
        let libraries = libraries
            .into_iter()
            .map(|s| MockLibrary {
                settles_to: s.status,
                polls_left: 0,
                status: s,
            })
            .collect();
        state.clusters.insert(
            info.cluster_id.clone(),
            MockCluster {
                target: info.state,
                polls_left: 0,
                info,
                libraries,
            },
        );
    }

    /// Make the next call to `method` fail with `err`
    pub fn fail_next(&self, method: &'static str, err: ClientError) {
        let mut state = self.state.lock().unwrap();
        state.injected.entry(method).or_default().push_back(Some(err));
    }

    /// Let the next call to `method` through before any queued failure
    pub fn succeed_next(&self, method: &'static str) {
        let mut state = self.state.lock().unwrap();
        state.injected.entry(method).or_default().push_back(None);
    }

    /// The next `times` installs of `library` settle as failed
    pub fn fail_install(&self, library: LibrarySpec, times: u32) {
        let mut state = self.state.lock().unwrap();
        state.failing_installs.insert(library, times);
    }

    /// Force a cluster into `phase` immediately
    pub fn set_phase(&self, cluster_id: &str, phase: Phase) {
        let mut state = self.state.lock().unwrap();
        if let Some(cluster) = state.clusters.get_mut(cluster_id) {
            cluster.info.state = phase;
            cluster.target = phase;
            cluster.polls_left = 0;
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that change remote state, in order
    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn exists(&self, cluster_id: &str) -> bool {
        self.state.lock().unwrap().clusters.contains_key(cluster_id)
    }

    /// Record `call` and pop an injected failure for `method`, if any
    fn enter(&self, method: &'static str, call: Call) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.injected.get_mut(method).and_then(|q| q.pop_front()) {
            Some(Some(err)) => Err(err),
            _ => Ok(()),
        }
    }

    fn with_cluster<T>(
        &self,
        cluster_id: &str,
        f: impl FnOnce(&mut MockCluster, &mut HashMap<LibrarySpec, u32>, u32) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let mut state = self.state.lock().unwrap();
        let State {
            clusters,
            failing_installs,
            ..
        } = &mut *state;
        let cluster = clusters
            .get_mut(cluster_id)
            .ok_or_else(|| ClientError::not_found(format!("Cluster {} does not exist", cluster_id)))?;
        f(cluster, failing_installs, self.transition_polls)
    }
}

fn require_phase(cluster: &MockCluster, phase: Phase, op: &str) -> Result<(), ClientError> {
    if cluster.info.state != phase {
        return Err(ClientError::api(
            400,
            "INVALID_STATE",
            format!(
                "Cluster {} is in unexpected state {} for {}",
                cluster.info.cluster_id, cluster.info.state, op
            ),
        ));
    }
    Ok(())
}

fn transition(cluster: &mut MockCluster, via: Phase, to: Phase, polls: u32) {
    if polls == 0 {
        cluster.info.state = to;
    } else {
        cluster.info.state = via;
    }
    cluster.target = to;
    cluster.polls_left = polls.saturating_sub(1);
}

fn apply_shape(info: &mut ClusterInfo, spec: &ClusterSpec) {
    let shape: ClusterShape = spec.clone().into();
    info.cluster_name = shape.cluster_name;
    info.spark_version = shape.spark_version;
    info.node_type_id = shape.node_type_id;
    info.driver_node_type_id = shape.driver_node_type_id;
    info.num_workers = shape.num_workers.unwrap_or(0);
    info.autoscale = shape.autoscale;
    info.autotermination_minutes = shape.autotermination_minutes;
    info.spark_conf = shape.spark_conf;
    info.spark_env_vars = shape.spark_env_vars;
    info.custom_tags = shape.custom_tags;
    info.aws_attributes = shape.aws_attributes;
    info.azure_attributes = shape.azure_attributes;
    info.gcp_attributes = shape.gcp_attributes;
    info.instance_pool_id = shape.instance_pool_id;
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<String, ClientError> {
        self.enter("create_cluster", Call::Create)?;

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let cluster_id = format!("cluster-{}", state.next_id);

        let mut info = ClusterInfo {
            cluster_id: cluster_id.clone(),
            ..Default::default()
        };
        apply_shape(&mut info, spec);

        let mut cluster = MockCluster {
            info,
            target: Phase::Running,
            polls_left: 0,
            libraries: Vec::new(),
        };
        transition(&mut cluster, Phase::Pending, Phase::Running, self.transition_polls);
        state.clusters.insert(cluster_id.clone(), cluster);

        Ok(cluster_id)
    }

    async fn get_cluster(&self, cluster_id: &str) -> Result<ClusterInfo, ClientError> {
        self.enter("get_cluster", Call::Get(cluster_id.to_string()))?;
        self.with_cluster(cluster_id, |cluster, _, _| {
            let observed = cluster.info.clone();
            if cluster.info.state != cluster.target {
                if cluster.polls_left == 0 {
                    cluster.info.state = cluster.target;
                } else {
                    cluster.polls_left -= 1;
                }
            }
            Ok(observed)
        })
    }

    async fn start_cluster(&self, cluster_id: &str) -> Result<(), ClientError> {
        self.enter("start_cluster", Call::Start(cluster_id.to_string()))?;
        self.with_cluster(cluster_id, |cluster, _, polls| {
            require_phase(cluster, Phase::Terminated, "start")?;
            transition(cluster, Phase::Pending, Phase::Running, polls);
            Ok(())
        })
    }

    async fn edit_cluster(&self, cluster_id: &str, spec: &ClusterSpec) -> Result<(), ClientError> {
        self.enter("edit_cluster", Call::Edit(cluster_id.to_string()))?;
        self.with_cluster(cluster_id, |cluster, _, polls| {
            require_phase(cluster, Phase::Running, "edit")?;
            apply_shape(&mut cluster.info, spec);
            transition(cluster, Phase::Pending, Phase::Running, polls);
            Ok(())
        })
    }

    async fn delete_cluster(&self, cluster_id: &str) -> Result<(), ClientError> {
        self.enter("delete_cluster", Call::Delete(cluster_id.to_string()))?;
        self.with_cluster(cluster_id, |cluster, _, polls| {
            if cluster.info.state != Phase::Terminated {
                transition(cluster, Phase::Terminating, Phase::Terminated, polls);
            }
            Ok(())
        })
    }

    async fn permanent_delete_cluster(&self, cluster_id: &str) -> Result<(), ClientError> {
        self.enter(
            "permanent_delete_cluster",
            Call::PermanentDelete(cluster_id.to_string()),
        )?;
        self.with_cluster(cluster_id, |cluster, _, _| {
            if cluster.info.state == Phase::Terminated || cluster.info.state == Phase::Error {
                Ok(())
            } else {
                require_phase(cluster, Phase::Terminated, "permanent-delete")
            }
        })?;
        self.state.lock().unwrap().clusters.remove(cluster_id);
        Ok(())
    }

    async fn library_statuses(&self, cluster_id: &str) -> Result<Vec<LibraryStatus>, ClientError> {
        self.enter(
            "library_statuses",
            Call::LibraryStatuses(cluster_id.to_string()),
        )?;
        self.with_cluster(cluster_id, |cluster, _, _| {
            let observed = cluster.libraries.iter().map(|l| l.status.clone()).collect();
            for library in &mut cluster.libraries {
                if library.status.status != library.settles_to {
                    if library.polls_left == 0 {
                        library.status.status = library.settles_to;
                        if library.settles_to == InstallStatus::Failed {
                            library.status.messages = vec!["Library resolution failed".to_string()];
                        }
                    } else {
                        library.polls_left -= 1;
                    }
                }
            }
            Ok(observed)
        })
    }

    async fn install_libraries(
        &self,
        cluster_id: &str,
        libraries: &[LibrarySpec],
    ) -> Result<(), ClientError> {
        self.enter(
            "install_libraries",
            Call::Install(cluster_id.to_string(), libraries.to_vec()),
        )?;
        self.with_cluster(cluster_id, |cluster, failing, polls| {
            require_phase(cluster, Phase::Running, "library install")?;
            for spec in libraries {
                let settles_to = match failing.get_mut(spec) {
                    Some(left) if *left > 0 => {
                        *left -= 1;
                        InstallStatus::Failed
                    }
                    _ => InstallStatus::Installed,
                };
                cluster.libraries.retain(|l| &l.status.library != spec);
                let initial = if polls == 0 {
                    settles_to
                } else {
                    InstallStatus::Pending
                };
                cluster.libraries.push(MockLibrary {
                    status: LibraryStatus::new(spec.clone(), initial),
                    settles_to,
                    polls_left: polls.saturating_sub(1),
                });
            }
            Ok(())
        })
    }

    async fn uninstall_libraries(
        &self,
        cluster_id: &str,
        libraries: &[LibrarySpec],
    ) -> Result<(), ClientError> {
        self.enter(
            "uninstall_libraries",
            Call::Uninstall(cluster_id.to_string(), libraries.to_vec()),
        )?;
        self.with_cluster(cluster_id, |cluster, _, _| {
            require_phase(cluster, Phase::Running, "library uninstall")?;
            for library in &mut cluster.libraries {
                if libraries.contains(&library.status.library) {
                    library.status.status = InstallStatus::UninstallOnRestart;
                    library.settles_to = InstallStatus::UninstallOnRestart;
                }
            }
            Ok(())
        })
    }
}
