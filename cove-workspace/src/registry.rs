//! Registry: the workspace list, the active selection and the auto-create guard, held in one
//! state cell and published to readers through a `watch` channel.
//!
//! The lock is never held across an `.await`: each operation reads what it needs, awaits the
//! service, then applies the answer in one synchronous step.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::policy::{self, AutoCreateState, DefaultWorkspacePolicy, PolicyAction, PolicyInput};
use crate::reconcile::{self, PendingMutations};
use crate::{validate_branch, validate_repo_url, ProvisioningService, Workspace};
use crate::{WorkspaceError, WorkspaceRequest};

pub const DEFAULT_LOCAL_WORKSPACE_ID: &str = "local";

/// What the registry knows about the list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ListStatus {
    /// No list call has answered yet.
    #[default]
    Unknown,
    Loaded,
    /// The last list call failed; the workspaces shown are the last known ones.
    Failed(String),
}

/// Read-only state handed to the rendering layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegistryView {
    pub workspaces: Vec<Workspace>,
    pub active_id: Option<String>,
    pub list_status: ListStatus,
    pub auto_create: AutoCreateState,
    /// Failure of the last automatic create, if it failed.
    pub last_error: Option<WorkspaceError>,
}

impl RegistryView {
    pub fn get(&self, id: &str) -> Option<&Workspace> {
        self.workspaces.iter().find(|w| w.id == id)
    }

    pub fn active(&self) -> Option<&Workspace> {
        self.active_id.as_deref().and_then(|id| self.get(id))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The service no longer knew the id; treated as done.
    AlreadyGone,
}

#[derive(Default)]
struct State {
    view: RegistryView,
    pending: PendingMutations,
    /// Bumped by every confirmed create/delete.
    generation: u64,
    list_issued: u64,
    list_applied: u64,
    /// Bumped by every change of the active selection.
    selection: u64,
}

impl State {
    fn set_active(&mut self, id: Option<String>) {
        if self.view.active_id != id {
            tracing::info!(from = ?self.view.active_id, to = ?id, "active workspace changed");
            self.view.active_id = id;
            self.selection += 1;
        }
    }

    fn confirm_create(&mut self, workspace: Workspace) {
        self.generation += 1;
        self.pending.record_create(self.generation, workspace.clone());
        match self.view.workspaces.iter_mut().find(|w| w.id == workspace.id) {
            Some(slot) => *slot = workspace,
            None => self.view.workspaces.push(workspace),
        }
    }

    fn confirm_delete(&mut self, id: &str) {
        self.generation += 1;
        self.pending.record_delete(self.generation, id);
        self.view.workspaces.retain(|w| w.id != id);
        if self.view.active_id.as_deref() == Some(id) {
            self.set_active(None);
        }
    }
}

/// Puts the auto-create guard back to `NotAttempted` when the create is dropped before the
/// service answered (the caller gave up on `refresh`).
struct PendingAutoCreate<'a> {
    registry: &'a Registry,
    answered: bool,
}

impl Drop for PendingAutoCreate<'_> {
    fn drop(&mut self) {
        if self.answered {
            return;
        }
        let mut guard = self.registry.lock();
        let state = &mut *guard;
        if state.view.auto_create == AutoCreateState::Pending {
            tracing::warn!("auto-provisioning abandoned before the service answered");
            state.view.auto_create = AutoCreateState::NotAttempted;
            self.registry.publish(state);
        }
    }
}

struct ListTicket {
    seq: u64,
    generation: u64,
}

/// Workspace registry backed by a [`ProvisioningService`].
pub struct Registry {
    service: Arc<dyn ProvisioningService>,
    defaults: Arc<dyn DefaultWorkspacePolicy>,
    local_id: String,
    state: Mutex<State>,
    tx: watch::Sender<RegistryView>,
}

impl Registry {
    pub fn new(
        service: Arc<dyn ProvisioningService>,
        defaults: Arc<dyn DefaultWorkspacePolicy>,
    ) -> Self {
        let (tx, _) = watch::channel(RegistryView::default());
        Self {
            service,
            defaults,
            local_id: DEFAULT_LOCAL_WORKSPACE_ID.to_string(),
            state: Mutex::new(State::default()),
            tx,
        }
    }

    /// Overrides the reserved id of the local workspace.
    pub fn with_local_id(mut self, local_id: impl Into<String>) -> Self {
        self.local_id = local_id.into();
        self
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Current view (cloned).
    pub fn view(&self) -> RegistryView {
        self.lock().view.clone()
    }

    /// Receiver that observes every published view.
    pub fn subscribe(&self) -> watch::Receiver<RegistryView> {
        self.tx.subscribe()
    }

    pub fn active_id(&self) -> Option<String> {
        self.lock().view.active_id.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State) {
        self.tx.send_replace(state.view.clone());
    }

    /// Lists workspaces, merges the answer and runs the auto-selection policy once.
    ///
    /// On failure the previous workspaces stay visible with [`ListStatus::Failed`]; the
    /// policy does not run. If the policy asks for a create, this call awaits it.
    pub async fn refresh(&self) -> Result<(), WorkspaceError> {
        let ticket = {
            let mut s = self.lock();
            s.list_issued += 1;
            ListTicket {
                seq: s.list_issued,
                generation: s.generation,
            }
        };

        let result = self.service.list_workspaces().await;

        let action = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let listed = match result {
                Ok(listed) => listed,
                Err(e) => {
                    if ticket.seq > state.list_applied {
                        tracing::warn!(error = %e, "workspace list failed");
                        state.view.list_status = ListStatus::Failed(e.to_string());
                        self.publish(state);
                    }
                    return Err(e);
                }
            };
            if ticket.seq < state.list_applied {
                tracing::debug!(seq = ticket.seq, "dropping list result older than the one applied");
                return Ok(());
            }
            state.list_applied = ticket.seq;
            state.view.workspaces = reconcile::merge_list(
                &state.view.workspaces,
                listed,
                &mut state.pending,
                ticket.generation,
            );
            state.view.list_status = ListStatus::Loaded;

            if let Some(active) = state.view.active_id.clone() {
                if state.view.get(&active).is_none() {
                    tracing::info!(id = %active, "active workspace no longer listed");
                    state.set_active(None);
                }
            }

            let decision = policy::decide(&PolicyInput {
                active_id: state.view.active_id.as_deref(),
                list_loaded: true,
                workspaces: &state.view.workspaces,
                local_id: &self.local_id,
                auto_create: state.view.auto_create,
                default_request: self.defaults.default_workspace(),
            });
            state.view.auto_create = decision.auto_create;
            if let PolicyAction::Select(id) = &decision.action {
                state.set_active(Some(id.clone()));
            }
            self.publish(state);
            decision.action
        };

        if let PolicyAction::Create(request) = action {
            self.auto_create(request).await;
        }
        Ok(())
    }

    async fn auto_create(&self, request: WorkspaceRequest) {
        let mut pending = PendingAutoCreate {
            registry: self,
            answered: false,
        };
        tracing::info!(repo = %request.repo_url, branch = %request.branch, "auto-provisioning default workspace");
        let result = match validate_repo_url(&request.repo_url)
            .and_then(|_| validate_branch(&request.branch))
        {
            Ok(()) => self.service.create_workspace(&request).await,
            Err(e) => Err(e),
        };
        pending.answered = true;

        let mut guard = self.lock();
        let state = &mut *guard;
        match result {
            Ok(workspace) => {
                state.view.auto_create = state.view.auto_create.resolved(true);
                state.view.last_error = None;
                let id = workspace.id.clone();
                state.confirm_create(workspace);
                if state.view.active_id.is_none() {
                    state.set_active(Some(id));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "auto-provisioning failed");
                state.view.auto_create = state.view.auto_create.resolved(false);
                state.view.last_error = Some(e);
            }
        }
        self.publish(state);
    }

    /// Requests a new workspace. The service answers right away with an `initializing` or
    /// `cloning` record.
    ///
    /// The new workspace becomes active only if the selection did not change while the call
    /// was in flight; otherwise it is just added to the list.
    pub async fn create(&self, repo_url: &str, branch: &str) -> Result<Workspace, WorkspaceError> {
        validate_repo_url(repo_url)?;
        validate_branch(branch)?;
        let request = WorkspaceRequest::new(repo_url, branch);
        let selection = self.lock().selection;

        let workspace = self.service.create_workspace(&request).await?;

        let mut guard = self.lock();
        let state = &mut *guard;
        state.confirm_create(workspace.clone());
        if state.selection == selection {
            state.set_active(Some(workspace.id.clone()));
        } else {
            tracing::debug!(id = %workspace.id, "selection changed during create; not activating");
        }
        self.publish(state);
        Ok(workspace)
    }

    /// Tears a workspace down. An id the service does not know counts as deleted.
    /// Deleting the active workspace clears the selection.
    ///
    /// The local workspace is not provisioned by the service and cannot be deleted: asking
    /// for it fails with [`WorkspaceError::Validation`] without calling the service.
    pub async fn delete(&self, id: &str) -> Result<DeleteOutcome, WorkspaceError> {
        if id == self.local_id {
            return Err(WorkspaceError::Validation(
                "the local workspace cannot be deleted".into(),
            ));
        }
        let outcome = match self.service.delete_workspace(id).await {
            Ok(ack) if ack.success => DeleteOutcome::Deleted,
            Ok(_) => {
                return Err(WorkspaceError::Transport(format!(
                    "provisioning service refused to delete {}",
                    id
                )))
            }
            Err(WorkspaceError::NotFound(_)) => {
                tracing::info!(id, "workspace already gone on delete");
                DeleteOutcome::AlreadyGone
            }
            Err(e) => return Err(e),
        };

        let mut guard = self.lock();
        let state = &mut *guard;
        state.confirm_delete(id);
        self.publish(state);
        Ok(outcome)
    }

    /// Sets (or clears, with `None`) the active workspace. The id must be listed.
    pub fn select(&self, id: Option<&str>) -> Result<(), WorkspaceError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(id) = id {
            if state.view.get(id).is_none() {
                return Err(WorkspaceError::NotFound(id.to_string()));
            }
        }
        state.set_active(id.map(String::from));
        self.publish(state);
        Ok(())
    }
}
