//! Workspace records as the provisioning service reports them (JSON, camelCase).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provisioning state. Forward-only (`initializing → cloning → ready → deleting`), except
/// that `error` may be reached from any state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceStatus {
    Initializing,
    Cloning,
    Ready,
    Error,
    Deleting,
}

impl WorkspaceStatus {
    fn rank(self) -> u8 {
        match self {
            WorkspaceStatus::Initializing => 0,
            WorkspaceStatus::Cloning => 1,
            WorkspaceStatus::Ready => 2,
            WorkspaceStatus::Deleting => 3,
            WorkspaceStatus::Error => 4,
        }
    }

    /// Whether a record may move from `self` to `next`.
    pub fn can_transition_to(self, next: WorkspaceStatus) -> bool {
        next == WorkspaceStatus::Error || (self != WorkspaceStatus::Error && next.rank() >= self.rank())
    }
}

/// One sandbox workspace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub repo_url: String,
    pub branch: String,
    pub status: WorkspaceStatus,
    /// Live-connection endpoint; present once ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opencode_url: Option<String>,
    /// Port → URL, populated only when ready.
    #[serde(default)]
    pub preview_urls: BTreeMap<u16, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Workspace {
    pub fn is_ready(&self) -> bool {
        self.status == WorkspaceStatus::Ready
    }

    /// Live endpoint, only when the workspace is ready and the service gave one.
    pub fn live_endpoint(&self) -> Option<&str> {
        if self.is_ready() {
            self.opencode_url.as_deref()
        } else {
            None
        }
    }
}

/// Body of a create request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRequest {
    pub repo_url: String,
    pub branch: String,
}

impl WorkspaceRequest {
    pub fn new(repo_url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            branch: branch.into(),
        }
    }
}

/// Reply to a delete request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAck {
    pub success: bool,
    pub id: String,
}
