//! Auto-selection / auto-provisioning reducer.
//!
//! [`decide`] is pure: given the current list, the active selection and the auto-create
//! guard, it returns what to do and the next guard value. The registry calls it once per
//! applied list result and stores the returned guard in the same state cell, so evaluating
//! the same list twice cannot issue two creates.

use crate::{Workspace, WorkspaceRequest};

/// Session-wide guard for the one automatic create.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AutoCreateState {
    #[default]
    NotAttempted,
    /// A create was issued and has not answered yet.
    Pending,
    /// A create succeeded; never re-armed during this session.
    Succeeded,
}

impl AutoCreateState {
    /// Guard value once the automatic create answered.
    pub fn resolved(self, success: bool) -> AutoCreateState {
        match (self, success) {
            (AutoCreateState::Succeeded, _) | (_, true) => AutoCreateState::Succeeded,
            (_, false) => AutoCreateState::NotAttempted,
        }
    }
}

/// Which repository to provision when the user has no workspace at all.
pub trait DefaultWorkspacePolicy: Send + Sync {
    /// `None` disables auto-provisioning.
    fn default_workspace(&self) -> Option<WorkspaceRequest>;
}

/// Always provisions the same repository and branch.
#[derive(Clone, Debug)]
pub struct FixedDefault {
    request: WorkspaceRequest,
}

impl FixedDefault {
    pub fn new(repo_url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            request: WorkspaceRequest::new(repo_url, branch),
        }
    }
}

impl DefaultWorkspacePolicy for FixedDefault {
    fn default_workspace(&self) -> Option<WorkspaceRequest> {
        Some(self.request.clone())
    }
}

/// Never auto-provisions.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDefault;

impl DefaultWorkspacePolicy for NoDefault {
    fn default_workspace(&self) -> Option<WorkspaceRequest> {
        None
    }
}

/// Everything [`decide`] looks at.
#[derive(Clone, Debug)]
pub struct PolicyInput<'a> {
    pub active_id: Option<&'a str>,
    /// False while the list is unknown or the last list call failed.
    pub list_loaded: bool,
    pub workspaces: &'a [Workspace],
    pub local_id: &'a str,
    pub auto_create: AutoCreateState,
    pub default_request: Option<WorkspaceRequest>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyAction {
    Nothing,
    Select(String),
    Create(WorkspaceRequest),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub action: PolicyAction,
    pub auto_create: AutoCreateState,
}

/// Picks the workspace to activate, or the one workspace to create.
///
/// Only acts when nothing is active and the list is known:
/// 1. the local workspace, if listed;
/// 2. else the first non-local workspace in list order;
/// 3. else, if the guard is `NotAttempted` and a default exists, one create (guard → `Pending`).
pub fn decide(input: &PolicyInput<'_>) -> Decision {
    let unchanged = Decision {
        action: PolicyAction::Nothing,
        auto_create: input.auto_create,
    };
    if input.active_id.is_some() || !input.list_loaded {
        return unchanged;
    }

    if input.workspaces.iter().any(|w| w.id == input.local_id) {
        return Decision {
            action: PolicyAction::Select(input.local_id.to_string()),
            auto_create: input.auto_create,
        };
    }
    if let Some(first) = input.workspaces.iter().find(|w| w.id != input.local_id) {
        return Decision {
            action: PolicyAction::Select(first.id.clone()),
            auto_create: input.auto_create,
        };
    }

    match (input.auto_create, &input.default_request) {
        (AutoCreateState::NotAttempted, Some(request)) => Decision {
            action: PolicyAction::Create(request.clone()),
            auto_create: AutoCreateState::Pending,
        },
        _ => unchanged,
    }
}
