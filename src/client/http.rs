//! HTTP implementation of the control plane over the REST 2.0 API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{ClientError, ControlPlane};
use crate::cluster::{ClusterInfo, ClusterSpec};
use crate::context::auth::{Credentials, ResolvedAuth};
use crate::library::{LibrarySpec, LibraryStatus};

/// Default timeout for a single HTTP request
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Wire types (pure, no I/O)
// ============================================================================

/// Error body returned by the control plane
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ClusterIdRequest<'a> {
    cluster_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateClusterResponse {
    cluster_id: String,
}

#[derive(Debug, Serialize)]
struct EditClusterRequest<'a> {
    cluster_id: &'a str,
    #[serde(flatten)]
    spec: &'a ClusterSpec,
}

#[derive(Debug, Serialize)]
struct ClusterLibraryList<'a> {
    cluster_id: &'a str,
    libraries: &'a [LibrarySpec],
}

#[derive(Debug, Deserialize)]
struct ClusterLibraryStatuses {
    #[serde(default)]
    library_statuses: Vec<LibraryStatus>,
}

/// Turn a non-success response into a classified error
pub fn classify_error(status: u16, body: &str) -> ClientError {
    if status == 401 || status == 403 {
        let message = serde_json::from_str::<ApiErrorBody>(body)
            .map(|b| b.message)
            .unwrap_or_else(|_| body.to_string());
        return ClientError::Auth { status, message };
    }

    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) if !parsed.message.is_empty() || !parsed.error_code.is_empty() => {
            ClientError::api(status, parsed.error_code, parsed.message)
        }
        _ => {
            let reason = StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown error");
            let message = if body.trim().is_empty() {
                reason.to_string()
            } else {
                body.to_string()
            };
            let code = if status == 404 { "NOT_FOUND" } else { "UNKNOWN" };
            ClientError::api(status, code, message)
        }
    }
}

/// Normalize a workspace host into a base URL without trailing slash
pub fn base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

// ============================================================================
// SBIO: I/O implementation (real HTTP client)
// ============================================================================

/// Control-plane client over the REST 2.0 API
#[derive(Clone)]
pub struct HttpControlPlane {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpControlPlane {
    /// Build a client from resolved credentials
    pub fn new(auth: &ResolvedAuth) -> Result<Self, ClientError> {
        Self::with_timeout(auth, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(auth: &ResolvedAuth, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("clustersync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url(&auth.host),
            credentials: auth.credentials.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/2.0/{}", self.base_url, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::Token(token) => req.bearer_auth(token),
            Credentials::Basic { username, password } => req.basic_auth(username, Some(password)),
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let response = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &text));
        }

        trace!(status = status.as_u16(), body = %text, "control plane response");
        let body = if text.trim().is_empty() { "{}" } else { text.as_str() };
        serde_json::from_str(body).map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        cluster_id: &str,
    ) -> Result<T, ClientError> {
        debug!("GET {} cluster_id={}", path, cluster_id);
        let req = self
            .client
            .get(self.url(path))
            .query(&[("cluster_id", cluster_id)]);
        self.send(req).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        debug!("POST {}", path);
        let req = self.client.post(self.url(path)).json(body);
        self.send(req).await
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<String, ClientError> {
        let created: CreateClusterResponse = self.post("clusters/create", spec).await?;
        Ok(created.cluster_id)
    }

    async fn get_cluster(&self, cluster_id: &str) -> Result<ClusterInfo, ClientError> {
        self.get("clusters/get", cluster_id).await
    }

    async fn start_cluster(&self, cluster_id: &str) -> Result<(), ClientError> {
        let _: IgnoredAny = self
            .post("clusters/start", &ClusterIdRequest { cluster_id })
            .await?;
        Ok(())
    }

    async fn edit_cluster(&self, cluster_id: &str, spec: &ClusterSpec) -> Result<(), ClientError> {
        let _: IgnoredAny = self
            .post("clusters/edit", &EditClusterRequest { cluster_id, spec })
            .await?;
        Ok(())
    }

    async fn delete_cluster(&self, cluster_id: &str) -> Result<(), ClientError> {
        let _: IgnoredAny = self
            .post("clusters/delete", &ClusterIdRequest { cluster_id })
            .await?;
        Ok(())
    }

    async fn permanent_delete_cluster(&self, cluster_id: &str) -> Result<(), ClientError> {
        let _: IgnoredAny = self
            .post("clusters/permanent-delete", &ClusterIdRequest { cluster_id })
            .await?;
        Ok(())
    }

    async fn library_statuses(&self, cluster_id: &str) -> Result<Vec<LibraryStatus>, ClientError> {
        let statuses: ClusterLibraryStatuses =
            self.get("libraries/cluster-status", cluster_id).await?;
        Ok(statuses.library_statuses)
    }

    async fn install_libraries(
        &self,
        cluster_id: &str,
        libraries: &[LibrarySpec],
    ) -> Result<(), ClientError> {
        let _: IgnoredAny = self
            .post(
                "libraries/install",
                &ClusterLibraryList {
                    cluster_id,
                    libraries,
                },
            )
            .await?;
        Ok(())
    }

    async fn uninstall_libraries(
        &self,
        cluster_id: &str,
        libraries: &[LibrarySpec],
    ) -> Result<(), ClientError> {
        let _: IgnoredAny = self
            .post(
                "libraries/uninstall",
                &ClusterLibraryList {
                    cluster_id,
                    libraries,
                },
            )
            .await?;
        Ok(())
    }
}
