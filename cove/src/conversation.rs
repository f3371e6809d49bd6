//! Normalized conversation store.
//!
//! A [`Snapshot`] is an immutable, ordered list of messages. Every operation here takes a
//! snapshot by reference and returns a new one; messages that did not change are shared
//! (`Arc`) between the two. Order is first-seen insertion order and in-place updates keep
//! their position, so replaying an event is harmless.

use std::sync::Arc;

use crate::message::{Message, MessageInfo, Part};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    messages: Arc<Vec<Arc<Message>>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a baseline from a history load. Duplicate ids collapse onto the first position.
    pub fn from_history(history: impl IntoIterator<Item = Message>) -> Self {
        history.into_iter().fold(Snapshot::new(), |snap, message| {
            let Message { info, parts } = message;
            let snap = upsert_message(&snap, info);
            parts
                .into_iter()
                .fold(snap, |snap, part| upsert_message_part(&snap, part))
        })
    }

    pub fn messages(&self) -> &[Arc<Message>] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, message_id: &str) -> Option<&Message> {
        self.position(message_id).map(|i| self.messages[i].as_ref())
    }

    /// Message ids in order.
    pub fn ids(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.id()).collect()
    }

    /// True when both snapshots are the same allocation (no-op operations return their input).
    pub fn ptr_eq(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.messages, &other.messages)
    }

    fn position(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id() == message_id)
    }

    fn with_messages(messages: Vec<Arc<Message>>) -> Self {
        Self {
            messages: Arc::new(messages),
        }
    }
}

/// Inserts a message or replaces its info in place. Existing parts are kept.
pub fn upsert_message(snapshot: &Snapshot, info: MessageInfo) -> Snapshot {
    let mut messages = snapshot.messages.as_ref().clone();
    match snapshot.position(&info.id) {
        Some(i) => {
            let parts = messages[i].parts.clone();
            messages[i] = Arc::new(Message { info, parts });
        }
        None => messages.push(Arc::new(Message::new(info))),
    }
    Snapshot::with_messages(messages)
}

/// Inserts or replaces a part on the message named by its `messageID`.
///
/// A part whose message is unknown is dropped: the input snapshot is returned as is.
pub fn upsert_message_part(snapshot: &Snapshot, part: Part) -> Snapshot {
    let Some(i) = snapshot.position(part.message_id()) else {
        tracing::debug!(part = %part.id(), message = %part.message_id(), "dropping part for unknown message");
        return snapshot.clone();
    };
    let mut message = snapshot.messages[i].as_ref().clone();
    match message.parts.iter().position(|p| p.id() == part.id()) {
        Some(j) => message.parts[j] = part,
        None => message.parts.push(part),
    }
    let mut messages = snapshot.messages.as_ref().clone();
    messages[i] = Arc::new(message);
    Snapshot::with_messages(messages)
}

pub fn remove_message(snapshot: &Snapshot, message_id: &str) -> Snapshot {
    let Some(i) = snapshot.position(message_id) else {
        return snapshot.clone();
    };
    let mut messages = snapshot.messages.as_ref().clone();
    messages.remove(i);
    Snapshot::with_messages(messages)
}

pub fn remove_message_part(snapshot: &Snapshot, part_id: &str, message_id: &str) -> Snapshot {
    let Some(i) = snapshot.position(message_id) else {
        return snapshot.clone();
    };
    let Some(j) = snapshot.messages[i].parts.iter().position(|p| p.id() == part_id) else {
        return snapshot.clone();
    };
    let mut message = snapshot.messages[i].as_ref().clone();
    message.parts.remove(j);
    let mut messages = snapshot.messages.as_ref().clone();
    messages[i] = Arc::new(message);
    Snapshot::with_messages(messages)
}
