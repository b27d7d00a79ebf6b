//! CLI module for clustersync
//!
//! Provides kubectl-like subcommands:
//! - `clustersync apply -f cluster.yaml` - Create or update a cluster from a manifest
//! - `clustersync delete <id>` - Terminate and purge a cluster
//! - `clustersync get <id>` - Show a cluster and its libraries
//! - `clustersync validate -f cluster.yaml` - Check a manifest without applying it
//! - `clustersync context` - Manage workspace contexts

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::context::AuthSettings;
use crate::poll::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};
use crate::reconcile::{ReconcileOptions, DEFAULT_LIBRARY_ATTEMPT_BUDGET};

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "clustersync")]
#[command(about = "Reconcile compute clusters and their libraries against declarative manifests")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: ~/.clustersync/config)
    #[arg(long, global = true, env = "CLUSTERSYNC_CONFIG")]
    pub config: Option<String>,

    /// Path to a .env file to load before resolving credentials
    #[arg(long, value_name = "FILE", global = true)]
    pub env_file: Option<PathBuf>,

    /// Workspace URL; overrides DATABRICKS_HOST and the current context
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Personal access token; overrides DATABRICKS_TOKEN and the current context
    #[arg(long, global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Credential layer given on the command line
    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            host: self.host.clone(),
            token: self.token.clone(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or update a cluster so it matches a manifest
    Apply(ApplyArgs),

    /// Terminate and permanently delete a cluster
    Delete(DeleteArgs),

    /// Show a cluster and its libraries
    Get(GetArgs),

    /// Validate a manifest without contacting the workspace
    Validate(ValidateArgs),

    /// Manage workspace contexts
    Context(ContextArgs),
}

/// Timing and retry knobs shared by mutating commands
#[derive(Parser, Debug, Clone)]
pub struct ReconcileArgs {
    /// Install submissions allowed per library
    #[arg(long, default_value_t = DEFAULT_LIBRARY_ATTEMPT_BUDGET)]
    pub attempt_budget: u32,

    /// Give up waiting on any single transition after this many seconds
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = DEFAULT_POLL_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_timeout: u64,

    /// Initial delay between status polls, in seconds
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = DEFAULT_POLL_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval: u64,
}

impl ReconcileArgs {
    pub fn to_options(&self) -> ReconcileOptions {
        ReconcileOptions::default()
            .with_attempt_budget(self.attempt_budget)
            .with_poll_timeout(Duration::from_secs(self.poll_timeout))
            .with_poll_interval(Duration::from_secs(self.poll_interval))
    }
}

/// Arguments for the apply command
#[derive(Parser, Debug)]
pub struct ApplyArgs {
    /// Path to the cluster manifest (YAML or JSON)
    #[arg(short, long)]
    pub file: PathBuf,

    /// Update this existing cluster instead of creating a new one
    #[arg(long)]
    pub cluster_id: Option<String>,

    #[command(flatten)]
    pub reconcile: ReconcileArgs,
}

/// Arguments for the delete command
#[derive(Parser, Debug)]
pub struct DeleteArgs {
    /// Cluster identifier
    pub cluster_id: String,

    #[command(flatten)]
    pub reconcile: ReconcileArgs,
}

/// Output format for `get`
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

/// Arguments for the get command
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Cluster identifier
    pub cluster_id: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the cluster manifest (YAML or JSON)
    #[arg(short, long)]
    pub file: PathBuf,
}

/// Arguments for the context command
#[derive(Parser, Debug)]
pub struct ContextArgs {
    #[command(subcommand)]
    pub action: ContextAction,
}

#[derive(Subcommand, Debug)]
pub enum ContextAction {
    /// List all contexts
    List,

    /// Show current context
    Current,

    /// Switch to a context
    Use {
        /// Context name
        name: String,
    },

    /// Add a new context
    Add {
        /// Context name
        name: String,

        /// Workspace URL
        #[arg(long)]
        host: String,

        /// Personal access token
        #[arg(long, conflicts_with_all = ["username", "password"])]
        token: Option<String>,

        /// Username for basic authentication
        #[arg(long, requires = "password")]
        username: Option<String>,

        /// Password for basic authentication
        #[arg(long, requires = "username")]
        password: Option<String>,

        /// Free-form description
        #[arg(long)]
        description: Option<String>,

        /// Replace an existing context with the same name
        #[arg(long)]
        overwrite: bool,
    },

    /// Delete a context
    Delete {
        /// Context name
        name: String,
    },
}
