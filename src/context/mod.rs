//! Workspace contexts
//!
//! A kubeconfig-style YAML file (`~/.clustersync/config` by default) holds
//! named contexts, each pointing at one workspace with its credentials, plus
//! the name of the current context.

pub mod auth;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use auth::{AuthError, AuthSettings, Credentials, ResolvedAuth};

/// Default config file location: ~/.clustersync/config
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".clustersync")
        .join("config")
}

/// Expand `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Errors that can occur during context operations
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Context '{0}' not found")]
    ContextNotFound(String),

    #[error("No current context set")]
    NoCurrentContext,

    #[error("Context '{0}' already exists")]
    AlreadyExists(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to write config: {0}")]
    WriteError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// A single workspace the CLI can talk to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Context {
    /// Display name for this context
    pub name: String,
    /// Workspace URL (e.g. "https://dbc-1234.cloud.databricks.com")
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Context {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            token: None,
            username: None,
            password: None,
            description: None,
        }
    }

    /// Context authenticating with a personal access token
    pub fn with_token(
        name: impl Into<String>,
        host: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let mut context = Self::new(name, host);
        context.token = Some(token.into());
        context
    }

    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Short label for the configured authentication method
    pub fn auth_method(&self) -> &'static str {
        match (&self.token, &self.username) {
            (Some(_), _) => "token",
            (None, Some(_)) => "basic",
            (None, None) => "none",
        }
    }
}

/// The complete configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Currently active context name
    #[serde(rename = "current-context")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,

    /// Map of context name to context definition
    #[serde(default)]
    pub contexts: BTreeMap<String, Context>,
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Parse config from YAML string
pub fn parse_config(content: &str) -> Result<Config, ContextError> {
    if content.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(content).map_err(|e| ContextError::ParseError(e.to_string()))
}

/// Serialize config to YAML string
pub fn serialize_config(config: &Config) -> Result<String, ContextError> {
    serde_yaml::to_string(config).map_err(|e| ContextError::WriteError(e.to_string()))
}

/// Add a context; an existing one is only replaced when `overwrite` is set
pub fn add_context(
    config: &mut Config,
    context: Context,
    overwrite: bool,
) -> Result<(), ContextError> {
    if !overwrite && config.contexts.contains_key(&context.name) {
        return Err(ContextError::AlreadyExists(context.name));
    }
    config.contexts.insert(context.name.clone(), context);
    Ok(())
}

/// Remove a context from the config
pub fn remove_context(config: &mut Config, name: &str) -> Result<Context, ContextError> {
    let removed = config
        .contexts
        .remove(name)
        .ok_or_else(|| ContextError::ContextNotFound(name.to_string()))?;
    if config.current_context.as_deref() == Some(name) {
        config.current_context = None;
    }
    Ok(removed)
}

/// Set the current context
pub fn set_current_context(config: &mut Config, name: &str) -> Result<(), ContextError> {
    if !config.contexts.contains_key(name) {
        return Err(ContextError::ContextNotFound(name.to_string()));
    }
    config.current_context = Some(name.to_string());
    Ok(())
}

impl Config {
    /// The current context, if one is selected
    pub fn current(&self) -> Result<Option<&Context>, ContextError> {
        match self.current_context.as_deref() {
            None => Ok(None),
            Some(name) => self
                .contexts
                .get(name)
                .map(Some)
                .ok_or_else(|| ContextError::ContextNotFound(name.to_string())),
        }
    }

    /// Context names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.contexts.keys().map(String::as_str).collect()
    }
}

// ============================================================================
// I/O boundary functions
// ============================================================================

/// Load config from a specific path; a missing file is an empty config
pub fn load_config_from(path: &Path) -> Result<Config, ContextError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Save config to a specific path
pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ContextError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serialize_config(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
