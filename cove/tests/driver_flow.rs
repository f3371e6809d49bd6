//! Event driver against the in-memory backend: connect, hydrate, apply, switch, degrade.

mod init_logging;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use cove::cove_workspace::WorkspaceStatus;
use cove::{ConnectionError, ConnectionStatus, EventDriver};
use fake_backend::*;
use stream_event::{LiveEvent, Stamped};

fn is_live(v: &cove::ConversationView) -> bool {
    v.status == ConnectionStatus::Live
}

#[tokio::test]
async fn applies_events_in_arrival_order() {
    let backend = Arc::new(FakeBackend::default());
    let driver = EventDriver::new(backend.clone());
    let mut rx = driver.subscribe();

    driver.switch_to(Some(&ready("sbx1")));
    wait_for(&mut rx, is_live).await;

    let ep = endpoint("sbx1");
    backend.emit(&ep, message_updated("m1", "s1"));
    backend.emit(&ep, text_updated("p1", "m1", "s1", "he"));
    backend.emit(&ep, text_updated("p1", "m1", "s1", "hello"));
    backend.emit(&ep, text_updated("p2", "ghost", "s1", "orphan"));
    backend.emit(&ep, message_updated("m2", "s1"));

    let view = wait_for(&mut rx, |v| v.snapshot.len() == 2).await;
    assert_eq!(view.workspace_id.as_deref(), Some("sbx1"));
    assert_eq!(view.snapshot.ids(), vec!["m1", "m2"]);
    assert_eq!(view.snapshot.get("m1").unwrap().texts(), vec!["hello"]);
    assert!(!view.stale);
}

#[tokio::test]
async fn events_from_previous_workspace_are_stale() {
    let backend = Arc::new(FakeBackend::default());
    let driver = EventDriver::new(backend.clone());
    let mut rx = driver.subscribe();

    driver.switch_to(Some(&ready("sbx1")));
    wait_for(&mut rx, is_live).await;
    let old = driver.current_envelope().unwrap();

    driver.switch_to(Some(&ready("sbx2")));
    let view = wait_for(&mut rx, |v| v.workspace_id.as_deref() == Some("sbx2") && is_live(v)).await;
    assert!(view.snapshot.is_empty());

    let err = driver
        .apply(Stamped {
            envelope: old.clone().with_seq(7),
            event: message_updated("m_old", "s1"),
        })
        .unwrap_err();
    assert_eq!(err.workspace_id, "sbx1");
    assert!(err.current_epoch > err.epoch);

    // Same workspace id but an older epoch is stale too.
    driver.reconnect();
    let reconnected = driver.current_envelope().unwrap();
    wait_for(&mut rx, is_live).await;
    let mut older = reconnected.clone();
    older.epoch -= 1;
    assert!(driver
        .apply(Stamped {
            envelope: older,
            event: message_updated("m_old", "s1"),
        })
        .is_err());
    assert!(driver
        .apply(Stamped {
            envelope: reconnected,
            event: message_updated("m_new", "s1"),
        })
        .is_ok());
    let view = driver.view();
    assert!(view.snapshot.get("m_old").is_none());
    assert!(view.snapshot.get("m_new").is_some());
}

#[tokio::test]
async fn selected_session_hydrates_history_and_filters_events() {
    let backend = Arc::new(FakeBackend::default());
    backend.set_history("s1", vec![history_message("h1", "s1", "earlier question")]);
    let driver = EventDriver::new(backend.clone());
    let mut rx = driver.subscribe();

    driver.switch_to(Some(&ready("sbx1")));
    driver.select_session(Some("s1".into()));
    let view = wait_for(&mut rx, |v| is_live(v) && v.session_id.as_deref() == Some("s1")).await;
    assert_eq!(view.snapshot.ids(), vec!["h1"]);

    let ep = endpoint("sbx1");
    backend.emit(&ep, message_updated("other", "s2"));
    backend.emit(&ep, message_updated("mine", "s1"));
    let view = wait_for(&mut rx, |v| v.snapshot.get("mine").is_some()).await;
    assert!(view.snapshot.get("other").is_none());
    assert_eq!(view.snapshot.ids(), vec!["h1", "mine"]);
}

#[tokio::test]
async fn stream_end_degrades_and_reconnect_rehydrates() {
    let backend = Arc::new(FakeBackend::default());
    let driver = EventDriver::new(backend.clone());
    let mut rx = driver.subscribe();

    driver.switch_to(Some(&ready("sbx1")));
    wait_for(&mut rx, is_live).await;
    let ep = endpoint("sbx1");
    backend.emit(&ep, message_updated("m1", "s1"));
    wait_for(&mut rx, |v| v.snapshot.len() == 1).await;

    backend.close(&ep);
    let view = wait_for(&mut rx, |v| matches!(v.status, ConnectionStatus::Degraded { .. })).await;
    assert!(view.stale);
    assert_eq!(view.snapshot.len(), 1);

    driver.reconnect();
    let view = wait_for(&mut rx, is_live).await;
    assert!(!view.stale);
    assert!(view.snapshot.is_empty());
    assert_eq!(backend.subscribes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn transport_error_degrades_but_bad_frame_does_not() {
    let backend = Arc::new(FakeBackend::default());
    let driver = EventDriver::new(backend.clone());
    let mut rx = driver.subscribe();

    driver.switch_to(Some(&ready("sbx1")));
    wait_for(&mut rx, is_live).await;
    let ep = endpoint("sbx1");
    backend.push(&ep, Err(ConnectionError::Decode("expected value".into())));
    backend.emit(&ep, message_updated("m1", "s1"));
    let view = wait_for(&mut rx, |v| v.snapshot.len() == 1).await;
    assert_eq!(view.status, ConnectionStatus::Live);

    backend.push(&ep, Err(ConnectionError::Transport("reset".into())));
    let view = wait_for(&mut rx, |v| !is_live(v)).await;
    assert_eq!(
        view.status,
        ConnectionStatus::Degraded {
            reason: "connection: reset".into()
        }
    );
}

#[tokio::test]
async fn failed_subscribe_degrades() {
    let backend = Arc::new(FakeBackend::default());
    backend.fail_subscribe.store(true, Ordering::SeqCst);
    let driver = EventDriver::new(backend.clone());
    let mut rx = driver.subscribe();

    driver.switch_to(Some(&ready("sbx1")));
    let view = wait_for(&mut rx, |v| matches!(v.status, ConnectionStatus::Degraded { .. })).await;
    assert!(view.stale);
}

#[tokio::test]
async fn unready_workspace_waits_without_subscribing() {
    let backend = Arc::new(FakeBackend::default());
    let driver = EventDriver::new(backend.clone());

    driver.switch_to(Some(&workspace("sbx1", WorkspaceStatus::Cloning, 0)));
    let view = driver.view();
    assert_eq!(view.status, ConnectionStatus::WaitingForWorkspace);
    assert_eq!(view.workspace_id.as_deref(), Some("sbx1"));
    assert_eq!(backend.subscribes.load(Ordering::SeqCst), 0);

    let mut rx = driver.subscribe();
    driver.switch_to(Some(&workspace("sbx1", WorkspaceStatus::Ready, 1)));
    wait_for(&mut rx, is_live).await;
    assert_eq!(backend.subscribes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn switching_to_same_workspace_keeps_subscription() {
    let backend = Arc::new(FakeBackend::default());
    let driver = EventDriver::new(backend.clone());
    let mut rx = driver.subscribe();

    driver.switch_to(Some(&ready("sbx1")));
    wait_for(&mut rx, is_live).await;
    let before = driver.current_envelope();
    driver.switch_to(Some(&ready("sbx1")));
    assert_eq!(driver.current_envelope(), before);
    assert_eq!(backend.subscribes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn clearing_workspace_resets_conversation() {
    let backend = Arc::new(FakeBackend::default());
    let driver = EventDriver::new(backend.clone());
    let mut rx = driver.subscribe();

    driver.switch_to(Some(&ready("sbx1")));
    wait_for(&mut rx, is_live).await;
    backend.emit(&endpoint("sbx1"), message_updated("m1", "s1"));
    wait_for(&mut rx, |v| v.snapshot.len() == 1).await;

    driver.switch_to(None);
    let view = driver.view();
    assert_eq!(view.status, ConnectionStatus::Idle);
    assert!(view.snapshot.is_empty());
    assert_eq!(view.workspace_id, None);
    assert!(driver.current_envelope().is_none());
    assert!(driver
        .apply(Stamped {
            envelope: stream_event::Envelope::new("sbx1", 1),
            event: LiveEvent::MessageRemoved {
                session_id: "s1".into(),
                message_id: "m1".into()
            },
        })
        .is_err());
}
