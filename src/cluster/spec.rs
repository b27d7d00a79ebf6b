//! Cluster shape - desired (`ClusterSpec`) and observed (`ClusterInfo`) state
//!
//! The remote API encodes sizing as two optional fields (`num_workers` and
//! `autoscale`) and cloud attributes as three optional blocks. `ClusterSpec`
//! folds both into closed enums, so a spec that made it through
//! deserialization already has exactly one sizing mode and at most one
//! cloud variant. `ClusterInfo` keeps the raw optional layout because the
//! control plane reports both fields for autoscaling clusters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::phase::Phase;

/// Default autotermination applied when a manifest leaves it out
pub const DEFAULT_AUTOTERMINATION_MINUTES: u32 = 60;

/// Lower bound for a non-zero autotermination timeout
pub const MIN_AUTOTERMINATION_MINUTES: u32 = 10;

/// Upper bound for autotermination
pub const MAX_AUTOTERMINATION_MINUTES: u32 = 10_000;

/// Errors raised when a desired spec breaks an invariant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("one of num_workers or autoscale must be set")]
    MissingSizing,

    #[error("num_workers and autoscale are mutually exclusive")]
    ConflictingSizing,

    #[error("autoscale min_workers ({min}) must not exceed max_workers ({max})")]
    AutoscaleRange { min: u32, max: u32 },

    #[error("spark_version must not be empty")]
    EmptySparkVersion,

    #[error("either node_type_id or instance_pool_id must be set")]
    MissingNodeType,

    #[error(
        "autotermination_minutes must be 0 or between {MIN_AUTOTERMINATION_MINUTES} and {MAX_AUTOTERMINATION_MINUTES}, got {0}"
    )]
    AutoterminationOutOfRange(u32),

    #[error("only one of aws_attributes, azure_attributes or gcp_attributes may be set")]
    ConflictingCloudAttributes,

    #[error("invalid library: {0}")]
    InvalidLibrary(String),
}

// ============================================================================
// Sizing and cloud attributes
// ============================================================================

/// Autoscale range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoScale {
    #[serde(default)]
    pub min_workers: u32,
    #[serde(default)]
    pub max_workers: u32,
}

/// How many workers a cluster runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sizing {
    /// Fixed number of workers
    Fixed(u32),
    /// Autoscale between min and max workers
    Autoscale(AutoScale),
}

impl Sizing {
    /// Autoscale between `min` and `max` workers
    pub fn autoscale(min: u32, max: u32) -> Self {
        Sizing::Autoscale(AutoScale {
            min_workers: min,
            max_workers: max,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwsAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_profile_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_on_demand: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_bid_price_percent: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ebs_volume_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ebs_volume_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ebs_volume_size: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AzureAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_on_demand: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_bid_max_price: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcpAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_preemptible_executors: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_service_account: Option<String>,
}

/// Cloud-specific attributes, keyed by cloud
#[derive(Debug, Clone, PartialEq)]
pub enum CloudAttributes {
    Aws(AwsAttributes),
    Azure(AzureAttributes),
    Gcp(GcpAttributes),
}

// ============================================================================
// ClusterSpec (desired state)
// ============================================================================

/// Desired shape of a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ClusterShape", into = "ClusterShape")]
pub struct ClusterSpec {
    pub cluster_name: String,
    pub spark_version: String,
    pub node_type_id: Option<String>,
    pub driver_node_type_id: Option<String>,
    pub sizing: Sizing,
    pub autotermination_minutes: u32,
    pub spark_conf: BTreeMap<String, String>,
    pub spark_env_vars: BTreeMap<String, String>,
    pub custom_tags: BTreeMap<String, String>,
    pub cloud: Option<CloudAttributes>,
    pub instance_pool_id: Option<String>,
}

impl ClusterSpec {
    /// Create a spec with the required fields and defaults for the rest
    pub fn new(spark_version: impl Into<String>, sizing: Sizing) -> Self {
        Self {
            cluster_name: String::new(),
            spark_version: spark_version.into(),
            node_type_id: None,
            driver_node_type_id: None,
            sizing,
            autotermination_minutes: DEFAULT_AUTOTERMINATION_MINUTES,
            spark_conf: BTreeMap::new(),
            spark_env_vars: BTreeMap::new(),
            custom_tags: BTreeMap::new(),
            cloud: None,
            instance_pool_id: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = name.into();
        self
    }

    pub fn with_node_type(mut self, node_type_id: impl Into<String>) -> Self {
        self.node_type_id = Some(node_type_id.into());
        self
    }

    pub fn with_autotermination(mut self, minutes: u32) -> Self {
        self.autotermination_minutes = minutes;
        self
    }

    pub fn with_instance_pool(mut self, pool_id: impl Into<String>) -> Self {
        self.instance_pool_id = Some(pool_id.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_tags.insert(key.into(), value.into());
        self
    }

    pub fn with_spark_conf(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spark_conf.insert(key.into(), value.into());
        self
    }

    pub fn with_cloud(mut self, cloud: CloudAttributes) -> Self {
        self.cloud = Some(cloud);
        self
    }

    /// Check the invariants that the type system does not already enforce
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Sizing::Autoscale(range) = self.sizing {
            if range.min_workers > range.max_workers {
                return Err(ValidationError::AutoscaleRange {
                    min: range.min_workers,
                    max: range.max_workers,
                });
            }
        }

        if self.spark_version.trim().is_empty() {
            return Err(ValidationError::EmptySparkVersion);
        }

        let has_node_type = self
            .node_type_id
            .as_deref()
            .is_some_and(|n| !n.trim().is_empty());
        if !has_node_type && self.instance_pool_id.is_none() {
            return Err(ValidationError::MissingNodeType);
        }

        let minutes = self.autotermination_minutes;
        if minutes != 0
            && !(MIN_AUTOTERMINATION_MINUTES..=MAX_AUTOTERMINATION_MINUTES).contains(&minutes)
        {
            return Err(ValidationError::AutoterminationOutOfRange(minutes));
        }

        Ok(())
    }

    /// Names of shape fields where the observed cluster differs from this spec.
    ///
    /// Fields the control plane fills with its own defaults (driver node
    /// type, cloud attributes) are only compared when the spec sets them,
    /// and then only on the keys the spec sets.
    pub fn shape_diff(&self, observed: &ClusterInfo) -> Vec<&'static str> {
        let mut changed = Vec::new();

        if self.cluster_name != observed.cluster_name {
            changed.push("cluster_name");
        }
        if self.spark_version != observed.spark_version {
            changed.push("spark_version");
        }
        if self.node_type_id.is_some() && self.node_type_id != observed.node_type_id {
            changed.push("node_type_id");
        }
        if self.driver_node_type_id.is_some()
            && self.driver_node_type_id != observed.driver_node_type_id
        {
            changed.push("driver_node_type_id");
        }
        if self.sizing != observed.sizing() {
            changed.push("sizing");
        }
        if self.autotermination_minutes != observed.autotermination_minutes {
            changed.push("autotermination_minutes");
        }
        if self.spark_conf != observed.spark_conf {
            changed.push("spark_conf");
        }
        if self.spark_env_vars != observed.spark_env_vars {
            changed.push("spark_env_vars");
        }
        if self.custom_tags != observed.custom_tags {
            changed.push("custom_tags");
        }
        if self.instance_pool_id != observed.instance_pool_id {
            changed.push("instance_pool_id");
        }

        let cloud_matches = match &self.cloud {
            None => true,
            Some(CloudAttributes::Aws(aws)) => is_subset(aws, observed.aws_attributes.as_ref()),
            Some(CloudAttributes::Azure(azure)) => {
                is_subset(azure, observed.azure_attributes.as_ref())
            }
            Some(CloudAttributes::Gcp(gcp)) => is_subset(gcp, observed.gcp_attributes.as_ref()),
        };
        if !cloud_matches {
            changed.push("cloud_attributes");
        }

        changed
    }
}

/// True when every key set in `desired` has the same value in `observed`
fn is_subset<T: Serialize>(desired: &T, observed: Option<&T>) -> bool {
    let desired = serde_json::to_value(desired).unwrap_or(Value::Null);
    let observed = observed
        .and_then(|o| serde_json::to_value(o).ok())
        .unwrap_or(Value::Null);

    match desired {
        Value::Object(fields) => fields
            .iter()
            .all(|(key, value)| observed.get(key) == Some(value)),
        Value::Null => true,
        other => other == observed,
    }
}

// ============================================================================
// Wire layout shared by create/edit requests
// ============================================================================

/// Flat wire layout of a cluster shape, as the control plane expects it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterShape {
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub spark_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_node_type_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_workers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoscale: Option<AutoScale>,
    #[serde(default = "default_autotermination")]
    pub autotermination_minutes: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spark_conf: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spark_env_vars: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_attributes: Option<AwsAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure_attributes: Option<AzureAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcp_attributes: Option<GcpAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_pool_id: Option<String>,
}

fn default_autotermination() -> u32 {
    DEFAULT_AUTOTERMINATION_MINUTES
}

impl TryFrom<ClusterShape> for ClusterSpec {
    type Error = ValidationError;

    fn try_from(shape: ClusterShape) -> Result<Self, Self::Error> {
        let sizing = match (shape.num_workers, shape.autoscale) {
            (Some(n), None) => Sizing::Fixed(n),
            (None, Some(range)) => Sizing::Autoscale(range),
            (Some(_), Some(_)) => return Err(ValidationError::ConflictingSizing),
            (None, None) => return Err(ValidationError::MissingSizing),
        };

        let cloud = match (
            shape.aws_attributes,
            shape.azure_attributes,
            shape.gcp_attributes,
        ) {
            (None, None, None) => None,
            (Some(aws), None, None) => Some(CloudAttributes::Aws(aws)),
            (None, Some(azure), None) => Some(CloudAttributes::Azure(azure)),
            (None, None, Some(gcp)) => Some(CloudAttributes::Gcp(gcp)),
            _ => return Err(ValidationError::ConflictingCloudAttributes),
        };

        Ok(Self {
            cluster_name: shape.cluster_name,
            spark_version: shape.spark_version,
            node_type_id: shape.node_type_id,
            driver_node_type_id: shape.driver_node_type_id,
            sizing,
            autotermination_minutes: shape.autotermination_minutes,
            spark_conf: shape.spark_conf,
            spark_env_vars: shape.spark_env_vars,
            custom_tags: shape.custom_tags,
            cloud,
            instance_pool_id: shape.instance_pool_id,
        })
    }
}

impl From<ClusterSpec> for ClusterShape {
    fn from(spec: ClusterSpec) -> Self {
        let (num_workers, autoscale) = match spec.sizing {
            Sizing::Fixed(n) => (Some(n), None),
            Sizing::Autoscale(range) => (None, Some(range)),
        };

        let mut shape = ClusterShape {
            cluster_name: spec.cluster_name,
            spark_version: spec.spark_version,
            node_type_id: spec.node_type_id,
            driver_node_type_id: spec.driver_node_type_id,
            num_workers,
            autoscale,
            autotermination_minutes: spec.autotermination_minutes,
            spark_conf: spec.spark_conf,
            spark_env_vars: spec.spark_env_vars,
            custom_tags: spec.custom_tags,
            instance_pool_id: spec.instance_pool_id,
            ..Default::default()
        };

        match spec.cloud {
            Some(CloudAttributes::Aws(aws)) => shape.aws_attributes = Some(aws),
            Some(CloudAttributes::Azure(azure)) => shape.azure_attributes = Some(azure),
            Some(CloudAttributes::Gcp(gcp)) => shape.gcp_attributes = Some(gcp),
            None => {}
        }

        shape
    }
}

// ============================================================================
// ClusterInfo (observed state)
// ============================================================================

/// Observed state of a cluster as reported by the control plane
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterInfo {
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub spark_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_node_type_id: Option<String>,
    #[serde(default)]
    pub num_workers: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoscale: Option<AutoScale>,
    #[serde(default)]
    pub autotermination_minutes: u32,
    #[serde(default)]
    pub spark_conf: BTreeMap<String, String>,
    #[serde(default)]
    pub spark_env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub custom_tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_attributes: Option<AwsAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure_attributes: Option<AzureAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcp_attributes: Option<GcpAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_pool_id: Option<String>,

    /// Current lifecycle phase
    #[serde(default)]
    pub state: Phase,

    /// Human-readable explanation of the current state
    #[serde(default)]
    pub state_message: String,

    /// Epoch milliseconds of the last start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,

    /// Epoch milliseconds of the last termination
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_time: Option<i64>,
}

impl ClusterInfo {
    /// Observed sizing; autoscale wins because `num_workers` then only
    /// reports the current worker count
    pub fn sizing(&self) -> Sizing {
        match self.autoscale {
            Some(range) => Sizing::Autoscale(range),
            None => Sizing::Fixed(self.num_workers),
        }
    }

    /// Short human-readable sizing, e.g. `4` or `1-8`
    pub fn sizing_label(&self) -> String {
        match self.sizing() {
            Sizing::Fixed(n) => n.to_string(),
            Sizing::Autoscale(r) => format!("{}-{}", r.min_workers, r.max_workers),
        }
    }
}
