//! The `Cove` facade end to end with in-memory provisioning and backend.

mod init_logging;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cove::cove_workspace::{
    AutoCreateState, DeleteAck, FixedDefault, NoDefault, ProvisioningService, Registry, Workspace,
    WorkspaceError, WorkspaceRequest, WorkspaceStatus,
};
use cove::{ConnectionStatus, Cove, CoveError};
use fake_backend::*;

#[derive(Default)]
struct FakeProvisioning {
    listed: Mutex<Vec<Workspace>>,
    creates: AtomicUsize,
}

impl FakeProvisioning {
    fn with(list: Vec<Workspace>) -> Arc<Self> {
        let fake = Self::default();
        *fake.listed.lock().unwrap() = list;
        Arc::new(fake)
    }
}

#[async_trait]
impl ProvisioningService for FakeProvisioning {
    async fn create_workspace(
        &self,
        request: &WorkspaceRequest,
    ) -> Result<Workspace, WorkspaceError> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        let mut ws = workspace(&format!("new{}", n), WorkspaceStatus::Initializing, 0);
        ws.repo_url = request.repo_url.clone();
        self.listed.lock().unwrap().push(ws.clone());
        Ok(ws)
    }

    async fn list_workspaces(&self) -> Result<Vec<Workspace>, WorkspaceError> {
        Ok(self.listed.lock().unwrap().clone())
    }

    async fn delete_workspace(&self, id: &str) -> Result<DeleteAck, WorkspaceError> {
        self.listed.lock().unwrap().retain(|w| w.id != id);
        Ok(DeleteAck {
            success: true,
            id: id.to_string(),
        })
    }
}

fn cove_with(fake: &Arc<FakeProvisioning>, backend: &Arc<FakeBackend>) -> Cove {
    Cove::new(Registry::new(fake.clone(), Arc::new(NoDefault)), backend.clone())
}

fn is_live(v: &cove::ConversationView) -> bool {
    v.status == ConnectionStatus::Live
}

#[tokio::test]
async fn refresh_selects_local_and_connects() {
    let fake = FakeProvisioning::with(vec![ready("sbx1"), ready("local")]);
    let backend = Arc::new(FakeBackend::default());
    let cove = cove_with(&fake, &backend);
    let mut rx = cove.subscribe_conversation();

    cove.refresh().await.unwrap();
    assert_eq!(cove.active_workspace_id().as_deref(), Some("local"));
    let view = wait_for(&mut rx, is_live).await;
    assert_eq!(view.workspace_id.as_deref(), Some("local"));
}

#[tokio::test]
async fn deleting_active_workspace_clears_conversation() {
    let fake = FakeProvisioning::with(vec![ready("sbx1")]);
    let backend = Arc::new(FakeBackend::default());
    let cove = cove_with(&fake, &backend);
    let mut rx = cove.subscribe_conversation();

    cove.refresh().await.unwrap();
    wait_for(&mut rx, is_live).await;
    backend.emit(&endpoint("sbx1"), message_updated("m1", "s1"));
    wait_for(&mut rx, |v| v.snapshot.len() == 1).await;

    cove.delete_workspace("sbx1").await.unwrap();
    assert_eq!(cove.active_workspace_id(), None);
    let view = cove.conversation();
    assert!(view.snapshot.is_empty());
    assert_eq!(view.status, ConnectionStatus::Idle);
    assert!(cove.workspaces().is_empty());
}

#[tokio::test]
async fn waiting_workspace_connects_once_listed_ready() {
    let fake = FakeProvisioning::with(vec![workspace("sbx1", WorkspaceStatus::Cloning, 0)]);
    let backend = Arc::new(FakeBackend::default());
    let cove = cove_with(&fake, &backend);
    let mut rx = cove.subscribe_conversation();

    cove.refresh().await.unwrap();
    assert_eq!(cove.conversation().status, ConnectionStatus::WaitingForWorkspace);
    assert!(matches!(
        cove.sessions().await,
        Err(CoveError::WorkspaceNotReady(id)) if id == "sbx1"
    ));

    *fake.listed.lock().unwrap() = vec![workspace("sbx1", WorkspaceStatus::Ready, 5)];
    cove.refresh().await.unwrap();
    wait_for(&mut rx, is_live).await;
    assert_eq!(backend.subscribes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn auto_provisioned_workspace_becomes_active() {
    let fake = FakeProvisioning::with(vec![]);
    let backend = Arc::new(FakeBackend::default());
    let cove = Cove::new(
        Registry::new(
            fake.clone(),
            Arc::new(FixedDefault::new("https://github.com/acme/starter", "main")),
        ),
        backend.clone(),
    );

    cove.refresh().await.unwrap();
    cove.refresh().await.unwrap();
    assert_eq!(fake.creates.load(Ordering::SeqCst), 1);
    let view = cove.registry_view();
    assert_eq!(view.auto_create, AutoCreateState::Succeeded);
    assert_eq!(view.active_id.as_deref(), Some("new1"));
    assert_eq!(cove.conversation().status, ConnectionStatus::WaitingForWorkspace);
}

#[tokio::test]
async fn session_and_provider_lists_are_scoped_to_the_workspace() {
    let fake = FakeProvisioning::with(vec![ready("sbx1"), ready("sbx2")]);
    let backend = Arc::new(FakeBackend::default());
    let cove = cove_with(&fake, &backend);

    cove.refresh().await.unwrap();
    cove.sessions().await.unwrap();
    cove.sessions().await.unwrap();
    cove.providers().await.unwrap();
    let providers = cove.providers().await.unwrap();
    assert_eq!(providers[0].id, "anthropic");
    assert_eq!(backend.session_lists.load(Ordering::SeqCst), 1);
    assert_eq!(backend.provider_lists.load(Ordering::SeqCst), 1);

    cove.select_workspace(Some("sbx2")).unwrap();
    cove.sessions().await.unwrap();
    cove.providers().await.unwrap();
    assert_eq!(backend.session_lists.load(Ordering::SeqCst), 2);
    assert_eq!(backend.provider_lists.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn send_without_session_creates_and_selects_one() {
    let fake = FakeProvisioning::with(vec![ready("sbx1")]);
    let backend = Arc::new(FakeBackend::default());
    let cove = cove_with(&fake, &backend);
    let mut rx = cove.subscribe_conversation();

    cove.refresh().await.unwrap();
    cove.send_message("hello").await.unwrap();
    cove.send_message("again").await.unwrap();

    assert_eq!(backend.created_sessions.load(Ordering::SeqCst), 1);
    let sent = backend.sent.lock().unwrap().clone();
    assert_eq!(
        sent,
        vec![
            (endpoint("sbx1"), "ses_new1".to_string(), "hello".to_string()),
            (endpoint("sbx1"), "ses_new1".to_string(), "again".to_string()),
        ]
    );
    let view = wait_for(&mut rx, |v| is_live(v) && v.session_id.is_some()).await;
    assert_eq!(view.session_id.as_deref(), Some("ses_new1"));
}

#[tokio::test]
async fn switching_workspace_drops_selected_session() {
    let fake = FakeProvisioning::with(vec![ready("sbx1"), ready("sbx2")]);
    let backend = Arc::new(FakeBackend::default());
    let cove = cove_with(&fake, &backend);

    cove.refresh().await.unwrap();
    cove.select_session(Some("s1")).unwrap();
    assert_eq!(cove.driver().session_id().as_deref(), Some("s1"));

    cove.select_workspace(Some("sbx2")).unwrap();
    assert_eq!(cove.driver().session_id(), None);
    assert_eq!(cove.conversation().workspace_id.as_deref(), Some("sbx2"));
}

#[tokio::test]
async fn operations_without_active_workspace_fail() {
    let fake = FakeProvisioning::with(vec![]);
    let backend = Arc::new(FakeBackend::default());
    let cove = cove_with(&fake, &backend);

    cove.refresh().await.unwrap();
    assert!(matches!(cove.sessions().await, Err(CoveError::NoActiveWorkspace)));
    assert!(matches!(cove.send_message("hi").await, Err(CoveError::NoActiveWorkspace)));
    assert!(matches!(cove.select_session(Some("s1")), Err(CoveError::NoActiveWorkspace)));
    assert!(matches!(
        cove.select_workspace(Some("ghost")),
        Err(CoveError::Workspace(WorkspaceError::NotFound(_)))
    ));
}

#[tokio::test]
async fn create_workspace_activates_and_waits() {
    let fake = FakeProvisioning::with(vec![ready("sbx1")]);
    let backend = Arc::new(FakeBackend::default());
    let cove = cove_with(&fake, &backend);

    cove.refresh().await.unwrap();
    let created = cove
        .create_workspace("git@github.com:acme/other.git", "main")
        .await
        .unwrap();
    assert_eq!(cove.active_workspace_id(), Some(created.id.clone()));
    assert_eq!(cove.conversation().workspace_id, Some(created.id));
    assert_eq!(cove.conversation().status, ConnectionStatus::WaitingForWorkspace);

    assert!(matches!(
        cove.create_workspace("ftp://nowhere", "main").await,
        Err(CoveError::Workspace(WorkspaceError::Validation(_)))
    ));
}

#[tokio::test]
async fn selection_made_on_the_registry_is_followed() {
    let fake = FakeProvisioning::with(vec![ready("sbx1"), ready("sbx2")]);
    let backend = Arc::new(FakeBackend::default());
    let cove = cove_with(&fake, &backend);
    let mut rx = cove.subscribe_conversation();

    cove.refresh().await.unwrap();
    wait_for(&mut rx, is_live).await;
    backend.emit(&endpoint("sbx1"), message_updated("m_sbx1", "s1"));
    wait_for(&mut rx, |v| v.snapshot.len() == 1).await;
    cove.sessions().await.unwrap();

    cove.registry().select(Some("sbx2")).unwrap();
    let view = wait_for(&mut rx, |v| {
        v.workspace_id.as_deref() == Some("sbx2") && is_live(v)
    })
    .await;
    assert!(view.snapshot.get("m_sbx1").is_none());
    cove.sessions().await.unwrap();
    assert_eq!(backend.session_lists.load(Ordering::SeqCst), 2);

    cove.registry().select(None).unwrap();
    let view = wait_for(&mut rx, |v| v.workspace_id.is_none()).await;
    assert_eq!(view.status, ConnectionStatus::Idle);
}

#[test]
fn imperative_calls_work_off_the_runtime_thread() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let fake = FakeProvisioning::with(vec![ready("sbx1"), ready("sbx2")]);
    let backend = Arc::new(FakeBackend::default());
    let cove = Cove::with_handle(
        Registry::new(fake.clone(), Arc::new(NoDefault)),
        backend.clone(),
        rt.handle().clone(),
    );
    let mut rx = cove.subscribe_conversation();
    rt.block_on(async {
        cove.refresh().await.unwrap();
        wait_for(&mut rx, is_live).await;
    });

    cove.select_workspace(Some("sbx2")).unwrap();
    cove.select_session(Some("s1")).unwrap();
    cove.reconnect();

    let view = rt.block_on(wait_for(&mut rx, |v| {
        v.workspace_id.as_deref() == Some("sbx2") && v.session_id.as_deref() == Some("s1") && is_live(v)
    }));
    assert!(view.snapshot.is_empty());
    assert_eq!(cove.active_workspace_id().as_deref(), Some("sbx2"));
}
