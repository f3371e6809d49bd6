//! The [`Cove`] facade: what the rendering layer holds.
//!
//! It wires the workspace [`Registry`] to the [`EventDriver`]: whenever the registry publishes
//! a new view, whoever changed it, the driver is pointed at the (possibly new) active
//! workspace and data cached for the previous workspace is dropped.

use std::sync::{Arc, Mutex, PoisonError};

use cove_workspace::{
    DefaultWorkspacePolicy, DeleteOutcome, FixedDefault, HttpProvisioningService, NoDefault,
    Registry, RegistryView, Workspace,
};
use env_config::Settings;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

use crate::backend::{OpencodeBackend, ProviderInfo, SessionInfo, WorkspaceBackend};
use crate::driver::{ConversationView, EventDriver};
use crate::CoveError;

/// A value fetched for one workspace; handed out only while that workspace is active.
struct ScopedCache<T> {
    slot: Mutex<Option<(String, T)>>,
}

impl<T: Clone> ScopedCache<T> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    fn get(&self, workspace_id: &str) -> Option<T> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match &*slot {
            Some((id, value)) if id == workspace_id => Some(value.clone()),
            _ => None,
        }
    }

    fn put(&self, workspace_id: &str, value: T) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((workspace_id.to_string(), value));
    }

    /// Drops the entry unless it belongs to `active`.
    fn retain(&self, active: Option<&str>) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().map(|(id, _)| id.as_str()) != active {
            *slot = None;
        }
    }

    fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Everything that has to follow the active workspace.
struct Scoped {
    registry: Registry,
    driver: EventDriver,
    sessions: ScopedCache<Vec<SessionInfo>>,
    providers: ScopedCache<Vec<ProviderInfo>>,
    /// Held from reading the registry view until the driver has switched, so a slower caller
    /// cannot apply an older view over a newer one.
    syncing: Mutex<()>,
}

impl Scoped {
    /// Points the driver at the active workspace and drops caches of any other one.
    fn sync_active(&self) {
        let _syncing = self.syncing.lock().unwrap_or_else(PoisonError::into_inner);
        let view = self.registry.view();
        let active = view.active();
        let active_id = active.map(|w| w.id.as_str());
        self.sessions.retain(active_id);
        self.providers.retain(active_id);
        self.driver.switch_to(active);
    }
}

async fn follow_registry(scoped: Arc<Scoped>, mut updates: watch::Receiver<RegistryView>) {
    while updates.changed().await.is_ok() {
        scoped.sync_active();
    }
}

/// Workspace and conversation state for one user session.
pub struct Cove {
    scoped: Arc<Scoped>,
    backend: Arc<dyn WorkspaceBackend>,
    follower: JoinHandle<()>,
}

impl Cove {
    /// Builds the facade on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; use [`with_handle`](Self::with_handle)
    /// there.
    pub fn new(registry: Registry, backend: Arc<dyn WorkspaceBackend>) -> Self {
        Self::with_handle(registry, backend, Handle::current())
    }

    /// Builds the facade with its background tasks on `runtime`. The methods may then be
    /// called from any thread.
    pub fn with_handle(
        registry: Registry,
        backend: Arc<dyn WorkspaceBackend>,
        runtime: Handle,
    ) -> Self {
        let updates = registry.subscribe();
        let scoped = Arc::new(Scoped {
            registry,
            driver: EventDriver::with_handle(backend.clone(), runtime.clone()),
            sessions: ScopedCache::new(),
            providers: ScopedCache::new(),
            syncing: Mutex::new(()),
        });
        let follower = runtime.spawn(follow_registry(scoped.clone(), updates));
        Self {
            scoped,
            backend,
            follower,
        }
    }

    /// Builds the HTTP provisioning client, the default-workspace policy and the OpenCode
    /// backend from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, CoveError> {
        let mut service =
            HttpProvisioningService::new(&settings.provisioning_url, settings.request_timeout)?;
        if let Some(token) = &settings.api_token {
            service = service.with_token(token.clone());
        }
        let defaults: Arc<dyn DefaultWorkspacePolicy> = match &settings.default_repo_url {
            Some(repo) => Arc::new(FixedDefault::new(repo.clone(), settings.default_branch.clone())),
            None => Arc::new(NoDefault),
        };
        let registry = Registry::new(Arc::new(service), defaults)
            .with_local_id(settings.local_workspace_id.clone());
        let backend = OpencodeBackend::new(settings.request_timeout)?;
        tracing::debug!(provisioning = %settings.provisioning_url, "cove client configured");
        Ok(Self::new(registry, Arc::new(backend)))
    }

    /// The underlying registry. Changes made through it are followed like the facade's own.
    pub fn registry(&self) -> &Registry {
        &self.scoped.registry
    }

    pub fn workspaces(&self) -> Vec<Workspace> {
        self.scoped.registry.view().workspaces
    }

    pub fn active_workspace_id(&self) -> Option<String> {
        self.scoped.registry.active_id()
    }

    pub fn registry_view(&self) -> RegistryView {
        self.scoped.registry.view()
    }

    pub fn conversation(&self) -> ConversationView {
        self.scoped.driver.view()
    }

    pub fn subscribe_registry(&self) -> watch::Receiver<RegistryView> {
        self.scoped.registry.subscribe()
    }

    pub fn subscribe_conversation(&self) -> watch::Receiver<ConversationView> {
        self.scoped.driver.subscribe()
    }

    /// Conversation views as a stream, starting with the current one.
    pub fn conversation_updates(&self) -> WatchStream<ConversationView> {
        WatchStream::new(self.scoped.driver.subscribe())
    }

    pub fn driver(&self) -> &EventDriver {
        &self.scoped.driver
    }

    /// Follows the registry now rather than when the follower task next runs.
    fn sync_active(&self) {
        self.scoped.sync_active();
    }

    /// Re-lists workspaces (running auto-selection) and follows the active one. A workspace
    /// that was waiting to become ready is connected once the list shows it ready.
    pub async fn refresh(&self) -> Result<(), CoveError> {
        let result = self.scoped.registry.refresh().await;
        self.sync_active();
        result.map_err(CoveError::from)
    }

    pub async fn create_workspace(&self, repo_url: &str, branch: &str) -> Result<Workspace, CoveError> {
        let result = self.scoped.registry.create(repo_url, branch).await;
        self.sync_active();
        Ok(result?)
    }

    pub async fn delete_workspace(&self, id: &str) -> Result<DeleteOutcome, CoveError> {
        let result = self.scoped.registry.delete(id).await;
        self.sync_active();
        Ok(result?)
    }

    pub fn select_workspace(&self, id: Option<&str>) -> Result<(), CoveError> {
        self.scoped.registry.select(id)?;
        self.sync_active();
        Ok(())
    }

    /// Reconnects the live stream of the active workspace (after a degraded connection).
    pub fn reconnect(&self) {
        self.scoped.driver.reconnect();
    }

    /// Active workspace id and its live endpoint.
    fn ready_endpoint(&self) -> Result<(String, String), CoveError> {
        let view = self.scoped.registry.view();
        let active = view.active().ok_or(CoveError::NoActiveWorkspace)?;
        let endpoint = active
            .live_endpoint()
            .ok_or_else(|| CoveError::WorkspaceNotReady(active.id.clone()))?;
        Ok((active.id.clone(), endpoint.to_string()))
    }

    fn still_active(&self, workspace_id: &str) -> Result<(), CoveError> {
        if self.active_workspace_id().as_deref() == Some(workspace_id) {
            Ok(())
        } else {
            tracing::debug!(workspace = workspace_id, "discarding answer for inactive workspace");
            Err(CoveError::WorkspaceChanged)
        }
    }

    /// Sessions of the active workspace (cached per workspace).
    pub async fn sessions(&self) -> Result<Vec<SessionInfo>, CoveError> {
        let (workspace_id, endpoint) = self.ready_endpoint()?;
        if let Some(cached) = self.scoped.sessions.get(&workspace_id) {
            return Ok(cached);
        }
        let sessions = self.backend.list_sessions(&endpoint).await?;
        self.still_active(&workspace_id)?;
        self.scoped.sessions.put(&workspace_id, sessions.clone());
        Ok(sessions)
    }

    /// Providers configured on the active workspace's server (cached per workspace).
    pub async fn providers(&self) -> Result<Vec<ProviderInfo>, CoveError> {
        let (workspace_id, endpoint) = self.ready_endpoint()?;
        if let Some(cached) = self.scoped.providers.get(&workspace_id) {
            return Ok(cached);
        }
        let providers = self.backend.list_providers(&endpoint).await?;
        self.still_active(&workspace_id)?;
        self.scoped.providers.put(&workspace_id, providers.clone());
        Ok(providers)
    }

    /// Selects a session of the active workspace; the conversation reloads its history.
    pub fn select_session(&self, session_id: Option<&str>) -> Result<(), CoveError> {
        if self.active_workspace_id().is_none() {
            return Err(CoveError::NoActiveWorkspace);
        }
        self.scoped.driver.select_session(session_id.map(String::from));
        Ok(())
    }

    /// Creates a session on the active workspace and selects it.
    pub async fn create_session(&self) -> Result<SessionInfo, CoveError> {
        let (workspace_id, endpoint) = self.ready_endpoint()?;
        let session = self.backend.create_session(&endpoint).await?;
        self.still_active(&workspace_id)?;
        self.scoped.sessions.clear();
        self.scoped.driver.select_session(Some(session.id.clone()));
        Ok(session)
    }

    /// Sends a user message to the selected session, creating a session first if none is
    /// selected. The reply streams into the conversation view.
    pub async fn send_message(&self, text: &str) -> Result<(), CoveError> {
        let (workspace_id, endpoint) = self.ready_endpoint()?;
        let session_id = match self.scoped.driver.session_id() {
            Some(id) => id,
            None => self.create_session().await?.id,
        };
        self.still_active(&workspace_id)?;
        self.backend.send_message(&endpoint, &session_id, text).await?;
        Ok(())
    }
}

impl Drop for Cove {
    fn drop(&mut self) {
        self.follower.abort();
    }
}
