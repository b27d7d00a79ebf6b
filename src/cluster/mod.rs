//! Cluster resource model
//!
//! - [`spec`]: desired shape (`ClusterSpec`) and observed state (`ClusterInfo`)
//! - [`phase`]: lifecycle phases and the actions legal in each

pub mod phase;
pub mod spec;

pub use phase::{Action, Phase};
pub use spec::{
    AutoScale, AwsAttributes, AzureAttributes, CloudAttributes, ClusterInfo, ClusterShape,
    ClusterSpec, GcpAttributes, Sizing, ValidationError, DEFAULT_AUTOTERMINATION_MINUTES,
};
