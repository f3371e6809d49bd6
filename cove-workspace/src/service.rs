//! Provisioning service: the remote that creates, lists and tears down sandboxes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use crate::{DeleteAck, Workspace, WorkspaceError, WorkspaceRequest};

/// Request/response API of the provisioning service.
///
/// Implementations map failures onto [`WorkspaceError`]: an unknown id is `NotFound`,
/// rejected input is `Validation`, everything else is `Transport`.
#[async_trait]
pub trait ProvisioningService: Send + Sync {
    /// Starts provisioning; the returned record is usually `initializing` or `cloning`.
    async fn create_workspace(&self, request: &WorkspaceRequest)
        -> Result<Workspace, WorkspaceError>;

    /// All workspaces of the current user/session.
    async fn list_workspaces(&self) -> Result<Vec<Workspace>, WorkspaceError>;

    async fn delete_workspace(&self, id: &str) -> Result<DeleteAck, WorkspaceError>;
}

/// JSON-over-HTTP provisioning client.
///
/// - `POST {base}/workspaces` with `{repoUrl, branch}`
/// - `GET {base}/workspaces`
/// - `DELETE {base}/workspaces/{id}`
pub struct HttpProvisioningService {
    base_url: Url,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpProvisioningService {
    /// Creates a client for `base_url` with the given per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, WorkspaceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkspaceError::Transport(e.to_string()))?;
        Self::with_client(base_url, client)
    }

    /// Uses a caller-built `reqwest::Client` (proxies, TLS roots, etc.).
    pub fn with_client(base_url: &str, client: reqwest::Client) -> Result<Self, WorkspaceError> {
        let mut base_url = Url::parse(base_url).map_err(|e| {
            WorkspaceError::Validation(format!("invalid provisioning URL {:?}: {}", base_url, e))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            token: None,
            client,
        })
    }

    /// Sends `Authorization: Bearer <token>` on every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, WorkspaceError> {
        self.base_url
            .join(path)
            .map_err(|e| WorkspaceError::Transport(e.to_string()))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        subject: &str,
    ) -> Result<reqwest::Response, WorkspaceError> {
        let res = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| WorkspaceError::Transport(e.to_string()))?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let body = res.text().await.unwrap_or_default();
        tracing::warn!(%status, subject, "provisioning request failed");
        Err(match status {
            StatusCode::NOT_FOUND => WorkspaceError::NotFound(subject.to_string()),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                WorkspaceError::Validation(error_text(&body, status))
            }
            _ => WorkspaceError::Transport(error_text(&body, status)),
        })
    }
}

/// Prefers the service's `{"error": "..."}` message over the raw body.
fn error_text(body: &str, status: StatusCode) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        format!("provisioning service returned {}", status)
    } else {
        format!("provisioning service returned {}: {}", status, message)
    }
}

#[async_trait]
impl ProvisioningService for HttpProvisioningService {
    async fn create_workspace(
        &self,
        request: &WorkspaceRequest,
    ) -> Result<Workspace, WorkspaceError> {
        let url = self.endpoint("workspaces")?;
        let res = self
            .send(self.client.post(url).json(request), &request.repo_url)
            .await?;
        res.json()
            .await
            .map_err(|e| WorkspaceError::Transport(format!("decode workspace: {}", e)))
    }

    async fn list_workspaces(&self) -> Result<Vec<Workspace>, WorkspaceError> {
        let url = self.endpoint("workspaces")?;
        let res = self.send(self.client.get(url), "workspaces").await?;
        res.json()
            .await
            .map_err(|e| WorkspaceError::Transport(format!("decode workspace list: {}", e)))
    }

    async fn delete_workspace(&self, id: &str) -> Result<DeleteAck, WorkspaceError> {
        let mut url = self.endpoint("workspaces/")?;
        url.path_segments_mut()
            .map_err(|_| WorkspaceError::Transport("provisioning URL cannot be a base".into()))?
            .pop_if_empty()
            .push(id);
        let res = self.send(self.client.delete(url), id).await?;
        res.json()
            .await
            .map_err(|e| WorkspaceError::Transport(format!("decode delete reply: {}", e)))
    }
}
