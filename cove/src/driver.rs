//! Event application driver.
//!
//! Owns the conversation of the active workspace: one subscription task per scope
//! (workspace, endpoint, selected session), each identified by an epoch. Every event the task
//! reads is stamped with `(workspace_id, epoch, seq)`; [`EventDriver::apply`] rejects stamps
//! from any other scope, so events still in flight from a previous workspace can never touch
//! the current snapshot.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cove_workspace::Workspace;
use futures::StreamExt;
use stream_event::{Envelope, EnvelopeState, LiveEvent, Stamped};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::WorkspaceBackend;
use crate::conversation::{self, Snapshot};
use crate::message::{MessageInfo, Part};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No workspace is active.
    #[default]
    Idle,
    /// The active workspace has no live endpoint yet.
    WaitingForWorkspace,
    Connecting,
    Live,
    /// The stream failed or ended; the snapshot is kept but marked stale.
    Degraded { reason: String },
}

/// What the rendering layer reads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationView {
    pub workspace_id: Option<String>,
    pub session_id: Option<String>,
    pub snapshot: Snapshot,
    pub status: ConnectionStatus,
    /// True once the connection degraded; cleared by the next successful connect.
    pub stale: bool,
}

/// An event stamped for a scope that is no longer current.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("stale event from workspace {workspace_id:?} epoch {epoch} (current epoch {current_epoch})")]
pub struct StaleEvent {
    pub workspace_id: String,
    pub epoch: u64,
    pub current_epoch: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Scope {
    workspace_id: Option<String>,
    endpoint: Option<String>,
    session_id: Option<String>,
}

#[derive(Default)]
struct State {
    scope: Scope,
    epoch: u64,
    view: ConversationView,
    task: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<State>,
    tx: watch::Sender<ConversationView>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State) {
        self.tx.send_replace(state.view.clone());
    }

    fn check(state: &State, envelope: &Envelope) -> Result<(), StaleEvent> {
        let current = state.scope.workspace_id.as_deref();
        if envelope.epoch != state.epoch || current != Some(envelope.workspace_id.as_str()) {
            return Err(StaleEvent {
                workspace_id: envelope.workspace_id.clone(),
                epoch: envelope.epoch,
                current_epoch: state.epoch,
            });
        }
        Ok(())
    }

    fn apply(&self, stamped: Stamped<LiveEvent>) -> Result<(), StaleEvent> {
        let mut guard = self.lock();
        let state = &mut *guard;
        Self::check(state, &stamped.envelope)?;

        if let (Some(selected), Some(event_session)) =
            (state.scope.session_id.as_deref(), stamped.event.session_id())
        {
            if selected != event_session {
                tracing::trace!(kind = stamped.event.kind(), session = event_session, "event for another session");
                return Ok(());
            }
        }

        let next = reduce(&state.view.snapshot, &stamped.event);
        if !next.ptr_eq(&state.view.snapshot) {
            state.view.snapshot = next;
            self.publish(state);
        }
        Ok(())
    }

    /// Runs `f` on the state if `envelope` is still current, then publishes.
    fn update_if_current(&self, envelope: &Envelope, f: impl FnOnce(&mut State)) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        if Self::check(state, envelope).is_err() {
            return false;
        }
        f(state);
        self.publish(state);
        true
    }

    fn degrade(&self, envelope: &Envelope, reason: String) {
        let applied = self.update_if_current(envelope, |state| {
            state.view.status = ConnectionStatus::Degraded {
                reason: reason.clone(),
            };
            state.view.stale = true;
        });
        if applied {
            tracing::warn!(workspace = %envelope.workspace_id, epoch = envelope.epoch, %reason, "live connection degraded");
        }
    }
}

/// Applies one live event to a snapshot. Malformed payloads leave it unchanged.
pub fn reduce(snapshot: &Snapshot, event: &LiveEvent) -> Snapshot {
    match event {
        LiveEvent::MessageUpdated { info } => match MessageInfo::from_value(info.clone()) {
            Ok(info) => conversation::upsert_message(snapshot, info),
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed message.updated");
                snapshot.clone()
            }
        },
        LiveEvent::PartUpdated { part, .. } => match Part::from_value(part.clone()) {
            Ok(part) => conversation::upsert_message_part(snapshot, part),
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed message.part.updated");
                snapshot.clone()
            }
        },
        LiveEvent::MessageRemoved { message_id, .. } => {
            conversation::remove_message(snapshot, message_id)
        }
        LiveEvent::PartRemoved {
            message_id,
            part_id,
            ..
        } => conversation::remove_message_part(snapshot, part_id, message_id),
        LiveEvent::Other { .. } => snapshot.clone(),
    }
}

/// Drives the conversation of the active workspace from its live event stream.
///
/// Subscription tasks run on the runtime the driver was built on, so the driver's methods
/// may be called from any thread.
pub struct EventDriver {
    backend: Arc<dyn WorkspaceBackend>,
    shared: Arc<Shared>,
    runtime: Handle,
}

impl EventDriver {
    /// Builds a driver on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; use [`with_handle`](Self::with_handle)
    /// there.
    pub fn new(backend: Arc<dyn WorkspaceBackend>) -> Self {
        Self::with_handle(backend, Handle::current())
    }

    pub fn with_handle(backend: Arc<dyn WorkspaceBackend>, runtime: Handle) -> Self {
        let (tx, _) = watch::channel(ConversationView::default());
        Self {
            backend,
            runtime,
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                tx,
            }),
        }
    }

    pub fn view(&self) -> ConversationView {
        self.shared.lock().view.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationView> {
        self.shared.tx.subscribe()
    }

    /// Envelope an event read right now from the current subscription would carry
    /// (`seq` left at 0). `None` while no workspace is active.
    pub fn current_envelope(&self) -> Option<Envelope> {
        let state = self.shared.lock();
        state
            .scope
            .workspace_id
            .as_ref()
            .map(|id| Envelope::new(id.clone(), state.epoch))
    }

    pub fn session_id(&self) -> Option<String> {
        self.shared.lock().scope.session_id.clone()
    }

    /// Follows the active workspace.
    ///
    /// Same workspace and endpoint as now: nothing happens (a degraded connection stays
    /// degraded until [`reconnect`](Self::reconnect)). Otherwise the old subscription is
    /// dropped, the snapshot is reset and a new one starts if the workspace is ready. The
    /// selected session survives only when the workspace id is unchanged.
    pub fn switch_to(&self, workspace: Option<&Workspace>) {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        let workspace_id = workspace.map(|w| w.id.clone());
        let endpoint = workspace.and_then(|w| w.live_endpoint()).map(String::from);
        if state.scope.workspace_id == workspace_id && state.scope.endpoint == endpoint {
            return;
        }
        let session_id = if state.scope.workspace_id == workspace_id {
            state.scope.session_id.take()
        } else {
            None
        };
        if state.scope.workspace_id != workspace_id {
            tracing::info!(from = ?state.scope.workspace_id, to = ?workspace_id, "conversation switching workspace");
        }
        state.scope = Scope {
            workspace_id,
            endpoint,
            session_id,
        };
        self.restart(state);
    }

    /// Selects (or clears) the session whose history and events are shown.
    pub fn select_session(&self, session_id: Option<String>) {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        if state.scope.session_id == session_id {
            return;
        }
        state.scope.session_id = session_id;
        self.restart(state);
    }

    /// Re-subscribes the current scope with a fresh epoch and a freshly hydrated snapshot.
    pub fn reconnect(&self) {
        let mut guard = self.shared.lock();
        self.restart(&mut guard);
    }

    /// Applies one stamped event in arrival order. Stamps from another workspace or an
    /// older epoch are rejected.
    pub fn apply(&self, stamped: Stamped<LiveEvent>) -> Result<(), StaleEvent> {
        self.shared.apply(stamped)
    }

    fn restart(&self, state: &mut State) {
        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.epoch += 1;
        state.view = ConversationView {
            workspace_id: state.scope.workspace_id.clone(),
            session_id: state.scope.session_id.clone(),
            snapshot: Snapshot::new(),
            status: ConnectionStatus::Idle,
            stale: false,
        };

        match (&state.scope.workspace_id, &state.scope.endpoint) {
            (None, _) => {}
            (Some(_), None) => state.view.status = ConnectionStatus::WaitingForWorkspace,
            (Some(workspace_id), Some(endpoint)) => {
                state.view.status = ConnectionStatus::Connecting;
                let envelope = EnvelopeState::new(workspace_id.clone(), state.epoch);
                state.task = Some(self.runtime.spawn(run_subscription(
                    self.shared.clone(),
                    self.backend.clone(),
                    envelope,
                    endpoint.clone(),
                    state.scope.session_id.clone(),
                )));
            }
        }
        self.shared.publish(state);
    }
}

impl Drop for EventDriver {
    fn drop(&mut self) {
        if let Some(task) = self.shared.lock().task.take() {
            task.abort();
        }
    }
}

/// Subscribes first, then hydrates, so events raised during the history load are not lost;
/// replaying them over the history is harmless.
async fn run_subscription(
    shared: Arc<Shared>,
    backend: Arc<dyn WorkspaceBackend>,
    mut envelope: EnvelopeState,
    endpoint: String,
    session_id: Option<String>,
) {
    let scope = Envelope::new(envelope.workspace_id(), envelope.epoch());

    let mut events = match backend.subscribe(&endpoint).await {
        Ok(events) => events,
        Err(e) => return shared.degrade(&scope, e.to_string()),
    };

    let baseline = match &session_id {
        Some(session_id) => match backend.history(&endpoint, session_id).await {
            Ok(history) => Snapshot::from_history(history),
            Err(e) => return shared.degrade(&scope, format!("history: {}", e)),
        },
        None => Snapshot::new(),
    };
    let live = shared.update_if_current(&scope, |state| {
        state.view.snapshot = baseline;
        state.view.status = ConnectionStatus::Live;
        state.view.stale = false;
    });
    if !live {
        return;
    }
    tracing::info!(workspace = %scope.workspace_id, epoch = scope.epoch, session = ?session_id, "live connection established");

    while let Some(item) = events.next().await {
        match item {
            Ok(event) => {
                if let Err(stale) = shared.apply(envelope.stamp(event)) {
                    tracing::debug!(%stale, "subscription superseded");
                    return;
                }
            }
            Err(crate::ConnectionError::Decode(reason)) => {
                tracing::warn!(%reason, "dropping undecodable event");
            }
            Err(e) => return shared.degrade(&scope, e.to_string()),
        }
    }
    shared.degrade(&scope, "event stream ended".to_string());
}
