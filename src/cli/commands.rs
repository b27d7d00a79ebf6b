//! Command implementations for the CLI
//!
//! SBIO pattern: Commands return Results, I/O is handled by caller

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::display::format_cluster_detail;
use super::OutputFormat;
use crate::client::{ClientError, ControlPlane};
use crate::config::{lint_manifest, load_manifest, LintReport, ManifestError};
use crate::context::{self, Config, Context, ContextError};
use crate::reconcile::{
    ObservedCluster, ReconcileFailure, ReconcileOptions, ReconciliationResult, Reconciler,
};

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("{0}")]
    Reconcile(#[from] ReconcileFailure),

    #[error("Cluster {0} does not exist")]
    NotFound(String),

    #[error("Failed to render output: {0}")]
    Render(String),
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

// ============================================================================
// Context Commands (Pure business logic)
// ============================================================================

/// Info about a context for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    pub name: String,
    pub host: String,
    pub auth: &'static str,
    pub is_current: bool,
}

impl ContextInfo {
    fn new(context: &Context, is_current: bool) -> Self {
        Self {
            name: context.name.clone(),
            host: context.host.clone(),
            auth: context.auth_method(),
            is_current,
        }
    }
}

/// List all contexts
pub fn context_list(config: &Config) -> Vec<ContextInfo> {
    let current = config.current_context.as_deref();
    config
        .contexts
        .values()
        .map(|ctx| ContextInfo::new(ctx, Some(ctx.name.as_str()) == current))
        .collect()
}

/// Get the current context
pub fn context_current(config: &Config) -> CommandResult<ContextInfo> {
    let ctx = config.current()?.ok_or(ContextError::NoCurrentContext)?;
    Ok(ContextInfo::new(ctx, true))
}

/// Switch to a context
pub fn context_use(config: &mut Config, name: &str) -> CommandResult<()> {
    context::set_current_context(config, name)?;
    Ok(())
}

/// Add a new context; the first context added becomes current
pub fn context_add(config: &mut Config, ctx: Context, overwrite: bool) -> CommandResult<()> {
    let name = ctx.name.clone();
    context::add_context(config, ctx, overwrite)?;
    if config.current_context.is_none() {
        context::set_current_context(config, &name)?;
    }
    Ok(())
}

/// Delete a context
pub fn context_delete(config: &mut Config, name: &str) -> CommandResult<Context> {
    Ok(context::remove_context(config, name)?)
}

// ============================================================================
// Validate Commands
// ============================================================================

/// Result of checking a manifest
#[derive(Debug)]
pub struct ManifestCheck {
    pub valid: bool,
    pub cluster_name: String,
    pub libraries: usize,
    pub lint: LintReport,
    pub error: Option<String>,
}

/// Load a manifest and lint it
pub fn validate_manifest(path: &Path) -> ManifestCheck {
    match load_manifest(path) {
        Ok(desired) => {
            let lint = lint_manifest(&desired);
            ManifestCheck {
                valid: lint.passed,
                cluster_name: desired.cluster.cluster_name.clone(),
                libraries: desired.libraries.len(),
                lint,
                error: None,
            }
        }
        Err(e) => ManifestCheck {
            valid: false,
            cluster_name: String::new(),
            libraries: 0,
            lint: LintReport::new(),
            error: Some(e.to_string()),
        },
    }
}

// ============================================================================
// Workspace Commands
// ============================================================================

/// Create or update the cluster described by a manifest
pub async fn apply(
    client: Arc<dyn ControlPlane>,
    manifest: &Path,
    cluster_id: Option<&str>,
    options: &ReconcileOptions,
    cancel: &CancellationToken,
) -> CommandResult<ReconciliationResult> {
    let desired = load_manifest(manifest)?;
    info!(
        manifest = %manifest.display(),
        cluster_id = cluster_id.unwrap_or("<new>"),
        libraries = desired.libraries.len(),
        "applying manifest"
    );
    let reconciler = Reconciler::new(client);
    Ok(reconciler
        .reconcile(&desired, cluster_id, options, cancel)
        .await)
}

/// Terminate and purge a cluster
pub async fn delete(
    client: Arc<dyn ControlPlane>,
    cluster_id: &str,
    options: &ReconcileOptions,
    cancel: &CancellationToken,
) -> ReconciliationResult {
    Reconciler::new(client)
        .delete(cluster_id, options, cancel)
        .await
}

/// Fetch a cluster and its libraries
pub async fn get(
    client: Arc<dyn ControlPlane>,
    cluster_id: &str,
) -> CommandResult<ObservedCluster> {
    Reconciler::new(client)
        .read(cluster_id)
        .await?
        .ok_or_else(|| CommandError::NotFound(cluster_id.to_string()))
}

/// Render an observed cluster in the requested format
pub fn render_cluster(observed: &ObservedCluster, format: OutputFormat) -> CommandResult<String> {
    let document = serde_json::json!({
        "cluster": observed.info,
        "libraries": observed.libraries,
    });
    match format {
        OutputFormat::Table => Ok(format_cluster_detail(observed)),
        OutputFormat::Json => serde_json::to_string_pretty(&document)
            .map(|s| s + "\n")
            .map_err(|e| CommandError::Render(e.to_string())),
        OutputFormat::Yaml => {
            serde_yaml::to_string(&document).map_err(|e| CommandError::Render(e.to_string()))
        }
    }
}
