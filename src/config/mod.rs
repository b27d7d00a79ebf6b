//! Cluster manifests
//!
//! A manifest is the declarative input of `apply` and `validate`: the flat
//! cluster shape plus an optional `libraries` list, written as YAML or JSON.

pub mod validation;

pub use validation::{lint_manifest, LintReport, Severity};

use std::path::Path;

use thiserror::Error;

use crate::reconcile::{DesiredState, ReconcileError};

/// Errors for loading a manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse {format} manifest: {message}")]
    ParseError {
        format: ManifestFormat,
        message: String,
    },

    #[error("Invalid manifest: {0}")]
    Invalid(#[source] ReconcileError),
}

/// Serialization format of a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Yaml,
    Json,
}

impl std::fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestFormat::Yaml => f.write_str("YAML"),
            ManifestFormat::Json => f.write_str("JSON"),
        }
    }
}

// ============================================================================
// SBIO: Pure parsing functions (no I/O)
// ============================================================================

impl ManifestFormat {
    /// Pick a format from the file extension, falling back to the content
    pub fn detect(path: Option<&Path>, content: &str) -> Self {
        let extension = path
            .and_then(|p| p.extension())
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("json") => ManifestFormat::Json,
            Some("yaml") | Some("yml") => ManifestFormat::Yaml,
            _ if content.trim_start().starts_with('{') => ManifestFormat::Json,
            _ => ManifestFormat::Yaml,
        }
    }
}

/// Parse and validate manifest text
pub fn parse_manifest(
    content: &str,
    format: ManifestFormat,
) -> Result<DesiredState, ManifestError> {
    let parse_error = |message: String| ManifestError::ParseError { format, message };

    let desired: DesiredState = match format {
        ManifestFormat::Json => {
            serde_json::from_str(content).map_err(|e| parse_error(e.to_string()))?
        }
        ManifestFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string()))?
        }
    };

    desired.validate().map_err(ManifestError::Invalid)?;
    Ok(desired)
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

/// Load, parse and validate a manifest file
pub fn load_manifest(path: &Path) -> Result<DesiredState, ManifestError> {
    let content = std::fs::read_to_string(path)?;
    let format = ManifestFormat::detect(Some(path), &content);
    parse_manifest(&content, format)
}
