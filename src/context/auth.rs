//! Credential resolution
//!
//! Settings come from three layers, highest priority first: explicit values
//! (CLI flags), `DATABRICKS_*` environment variables, and the current
//! workspace context. Layers are merged field by field, then the merged
//! settings must name exactly one authentication method and a host.

use thiserror::Error;

use super::Context;

pub const ENV_HOST: &str = "DATABRICKS_HOST";
pub const ENV_TOKEN: &str = "DATABRICKS_TOKEN";
pub const ENV_USERNAME: &str = "DATABRICKS_USERNAME";
pub const ENV_PASSWORD: &str = "DATABRICKS_PASSWORD";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication is not configured for provider")]
    NotConfigured,

    #[error("Host is empty, but is required by {0}")]
    MissingHost(&'static str),

    #[error("More than one authorization method configured: password and token")]
    ConflictingMethods,

    #[error("basic_auth requires both username and password")]
    IncompleteBasicAuth,
}

/// How requests authenticate
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Personal access token, sent as a bearer token
    Token(String),
    Basic { username: String, password: String },
}

impl Credentials {
    pub fn method(&self) -> &'static str {
        match self {
            Credentials::Token(_) => "token",
            Credentials::Basic { .. } => "basic_auth",
        }
    }
}

// secrets stay out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Token(***)"),
            Credentials::Basic { username, .. } => {
                write!(f, "Basic {{ username: {:?}, password: *** }}", username)
            }
        }
    }
}

/// Host plus credentials, ready to build a client from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAuth {
    /// Workspace URL, always with a scheme
    pub host: String,
    pub credentials: Credentials,
}

/// One layer of possibly incomplete settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSettings {
    pub host: Option<String>,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

// ============================================================================
// SBIO: Pure functions (no I/O)
// ============================================================================

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AuthSettings {
    /// Read the layer from a variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            host: non_empty(lookup(ENV_HOST)),
            token: non_empty(lookup(ENV_TOKEN)),
            username: non_empty(lookup(ENV_USERNAME)),
            password: non_empty(lookup(ENV_PASSWORD)),
        }
    }

    pub fn from_context(context: &Context) -> Self {
        Self {
            host: non_empty(Some(context.host.clone())),
            token: non_empty(context.token.clone()),
            username: non_empty(context.username.clone()),
            password: non_empty(context.password.clone()),
        }
    }

    /// Fill unset fields from `fallback`
    pub fn or(self, fallback: AuthSettings) -> Self {
        Self {
            host: non_empty(self.host).or(fallback.host),
            token: non_empty(self.token).or(fallback.token),
            username: non_empty(self.username).or(fallback.username),
            password: non_empty(self.password).or(fallback.password),
        }
    }

    /// Turn merged settings into a host and a single credential
    pub fn resolve(self) -> Result<ResolvedAuth, AuthError> {
        let has_basic = self.username.is_some() || self.password.is_some();

        let credentials = match (self.token, self.username, self.password) {
            (Some(_), _, _) if has_basic => return Err(AuthError::ConflictingMethods),
            (Some(token), None, None) => Credentials::Token(token),
            (None, Some(username), Some(password)) => Credentials::Basic { username, password },
            (None, Some(_), None) | (None, None, Some(_)) => {
                return Err(AuthError::IncompleteBasicAuth)
            }
            _ => return Err(AuthError::NotConfigured),
        };

        let host = self
            .host
            .ok_or(AuthError::MissingHost(credentials.method()))?;

        Ok(ResolvedAuth {
            host: normalize_host(&host),
            credentials,
        })
    }
}

/// Prefix a bare host name with `https://`
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

// ============================================================================
// I/O boundary
// ============================================================================

/// Resolve credentials from flags, the process environment and a context
pub fn resolve(
    explicit: AuthSettings,
    context: Option<&Context>,
) -> Result<ResolvedAuth, AuthError> {
    let env = AuthSettings::from_lookup(|name| std::env::var(name).ok());
    let from_context = context.map(AuthSettings::from_context).unwrap_or_default();
    explicit.or(env).or(from_context).resolve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> AuthSettings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AuthSettings::from_lookup(|name| vars.get(name).cloned())
    }

    fn explicit(host: Option<&str>, username: Option<&str>) -> AuthSettings {
        AuthSettings {
            host: host.map(String::from),
            username: username.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_nothing_configured() {
        let err = AuthSettings::default().resolve().unwrap_err();
        assert_eq!(err.to_string(), "Authentication is not configured for provider");
    }

    #[test]
    fn test_host_alone_is_not_enough() {
        let err = env(&[(ENV_HOST, "x")]).resolve().unwrap_err();
        assert_eq!(err, AuthError::NotConfigured);
    }

    #[test]
    fn test_token_requires_host() {
        let err = env(&[(ENV_TOKEN, "x")]).resolve().unwrap_err();
        assert_eq!(err.to_string(), "Host is empty, but is required by token");
    }

    #[test]
    fn test_basic_auth_requires_host() {
        let err = env(&[(ENV_USERNAME, "x"), (ENV_PASSWORD, "x")])
            .resolve()
            .unwrap_err();
        assert_eq!(err.to_string(), "Host is empty, but is required by basic_auth");
    }

    #[test]
    fn test_token_from_env() {
        let auth = env(&[(ENV_HOST, "x"), (ENV_TOKEN, "x")]).resolve().unwrap();
        assert_eq!(auth.host, "https://x");
        assert_eq!(auth.credentials, Credentials::Token("x".to_string()));
    }

    #[test]
    fn test_explicit_host_overrides_env() {
        let settings = explicit(Some("y"), None).or(env(&[
            (ENV_HOST, "x"),
            (ENV_USERNAME, "x"),
            (ENV_PASSWORD, "x"),
        ]));
        let auth = settings.resolve().unwrap();
        assert_eq!(auth.host, "https://y");
        assert_eq!(
            auth.credentials,
            Credentials::Basic {
                username: "x".to_string(),
                password: "x".to_string()
            }
        );
    }

    #[test]
    fn test_layers_merge_field_by_field() {
        let settings = explicit(Some("y"), Some("x")).or(env(&[(ENV_PASSWORD, "x")]));
        let auth = settings.resolve().unwrap();
        assert_eq!(auth.credentials.method(), "basic_auth");
    }

    #[test]
    fn test_token_and_password_conflict() {
        let err = env(&[
            (ENV_HOST, "x"),
            (ENV_TOKEN, "x"),
            (ENV_USERNAME, "x"),
            (ENV_PASSWORD, "x"),
        ])
        .resolve()
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "More than one authorization method configured: password and token"
        );
    }

    #[test]
    fn test_context_is_lowest_priority() {
        let context = Context::with_token("work", "dbc-1.cloud.databricks.com", "from-context");
        let settings = env(&[(ENV_TOKEN, "from-env")]).or(AuthSettings::from_context(&context));
        let auth = settings.resolve().unwrap();
        assert_eq!(auth.host, "https://dbc-1.cloud.databricks.com");
        assert_eq!(auth.credentials, Credentials::Token("from-env".to_string()));
    }

    #[test]
    fn test_empty_values_are_ignored() {
        let auth = env(&[(ENV_HOST, "https://x"), (ENV_TOKEN, "t"), (ENV_USERNAME, "")])
            .resolve()
            .unwrap();
        assert_eq!(auth.credentials, Credentials::Token("t".to_string()));
    }

    #[test]
    fn test_normalize_host_keeps_scheme() {
        assert_eq!(normalize_host("http://localhost:8080"), "http://localhost:8080");
        assert_eq!(normalize_host(" x "), "https://x");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = Credentials::Basic {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        let shown = format!("{:?}", creds);
        assert!(shown.contains("admin"));
        assert!(!shown.contains("hunter2"));
        assert!(!format!("{:?}", Credentials::Token("dapi123".to_string())).contains("dapi123"));
    }
}
