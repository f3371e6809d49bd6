//! Event types carried by the live connection (type + properties).
//! Message and part payloads stay `serde_json::Value`; cove decodes them into its own model.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const MESSAGE_UPDATED: &str = "message.updated";
pub const MESSAGE_PART_UPDATED: &str = "message.part.updated";
pub const MESSAGE_REMOVED: &str = "message.removed";
pub const MESSAGE_PART_REMOVED: &str = "message.part.removed";

/// One event from a workspace's live connection.
///
/// Only the four conversation events are typed; everything else (session status,
/// heartbeats, file watcher notices) is kept as [`LiveEvent::Other`] so callers can
/// ignore it without failing the stream.
#[derive(Clone, Debug, PartialEq)]
pub enum LiveEvent {
    /// `message.updated`: full message info record (insert or replace).
    MessageUpdated { info: Value },
    /// `message.part.updated`: full part record; `delta` is the appended text, when the server sends one.
    PartUpdated { part: Value, delta: Option<String> },
    /// `message.removed`
    MessageRemoved {
        session_id: String,
        message_id: String,
    },
    /// `message.part.removed`
    PartRemoved {
        session_id: String,
        message_id: String,
        part_id: String,
    },
    Other { kind: String, properties: Value },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    properties: Value,
}

#[derive(Deserialize)]
struct MessageUpdatedProps {
    info: Value,
}

#[derive(Deserialize)]
struct PartUpdatedProps {
    part: Value,
    #[serde(default)]
    delta: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct MessageRemovedProps {
    #[serde(rename = "sessionID")]
    session_id: String,
    #[serde(rename = "messageID")]
    message_id: String,
}

#[derive(Serialize, Deserialize)]
struct PartRemovedProps {
    #[serde(rename = "sessionID")]
    session_id: String,
    #[serde(rename = "messageID")]
    message_id: String,
    #[serde(rename = "partID")]
    part_id: String,
}

impl LiveEvent {
    /// Decodes one event object. Unknown `type` values become [`LiveEvent::Other`];
    /// a known type with malformed properties is an error.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let raw: RawEvent = serde_json::from_value(value)?;
        let event = match raw.kind.as_str() {
            MESSAGE_UPDATED => {
                let p: MessageUpdatedProps = serde_json::from_value(raw.properties)?;
                LiveEvent::MessageUpdated { info: p.info }
            }
            MESSAGE_PART_UPDATED => {
                let p: PartUpdatedProps = serde_json::from_value(raw.properties)?;
                LiveEvent::PartUpdated {
                    part: p.part,
                    delta: p.delta,
                }
            }
            MESSAGE_REMOVED => {
                let p: MessageRemovedProps = serde_json::from_value(raw.properties)?;
                LiveEvent::MessageRemoved {
                    session_id: p.session_id,
                    message_id: p.message_id,
                }
            }
            MESSAGE_PART_REMOVED => {
                let p: PartRemovedProps = serde_json::from_value(raw.properties)?;
                LiveEvent::PartRemoved {
                    session_id: p.session_id,
                    message_id: p.message_id,
                    part_id: p.part_id,
                }
            }
            _ => LiveEvent::Other {
                kind: raw.kind,
                properties: raw.properties,
            },
        };
        Ok(event)
    }

    /// Decodes one event from a JSON string (the `data` of an SSE frame).
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Wire `type` of this event.
    pub fn kind(&self) -> &str {
        match self {
            LiveEvent::MessageUpdated { .. } => MESSAGE_UPDATED,
            LiveEvent::PartUpdated { .. } => MESSAGE_PART_UPDATED,
            LiveEvent::MessageRemoved { .. } => MESSAGE_REMOVED,
            LiveEvent::PartRemoved { .. } => MESSAGE_PART_REMOVED,
            LiveEvent::Other { kind, .. } => kind,
        }
    }

    /// Session the event belongs to, when the payload names one.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            LiveEvent::MessageUpdated { info } => info.get("sessionID").and_then(Value::as_str),
            LiveEvent::PartUpdated { part, .. } => part.get("sessionID").and_then(Value::as_str),
            LiveEvent::MessageRemoved { session_id, .. }
            | LiveEvent::PartRemoved { session_id, .. } => Some(session_id),
            LiveEvent::Other { properties, .. } => {
                properties.get("sessionID").and_then(Value::as_str)
            }
        }
    }

    /// Serializes this event back into its wire object.
    pub fn to_value(&self) -> Value {
        match self {
            LiveEvent::MessageUpdated { info } => {
                json!({"type": MESSAGE_UPDATED, "properties": {"info": info}})
            }
            LiveEvent::PartUpdated { part, delta } => {
                let mut props = json!({ "part": part });
                if let Some(d) = delta {
                    props["delta"] = Value::String(d.clone());
                }
                json!({"type": MESSAGE_PART_UPDATED, "properties": props})
            }
            LiveEvent::MessageRemoved {
                session_id,
                message_id,
            } => json!({
                "type": MESSAGE_REMOVED,
                "properties": MessageRemovedProps {
                    session_id: session_id.clone(),
                    message_id: message_id.clone(),
                },
            }),
            LiveEvent::PartRemoved {
                session_id,
                message_id,
                part_id,
            } => json!({
                "type": MESSAGE_PART_REMOVED,
                "properties": PartRemovedProps {
                    session_id: session_id.clone(),
                    message_id: message_id.clone(),
                    part_id: part_id.clone(),
                },
            }),
            LiveEvent::Other { kind, properties } => {
                json!({"type": kind, "properties": properties})
            }
        }
    }
}
