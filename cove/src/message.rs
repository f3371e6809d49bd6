//! Message and part model as OpenCode reports it.
//!
//! A [`Message`] is an info record plus an ordered list of [`Part`]s. Parts are a closed sum
//! over the kinds the client renders specially (`text`, `tool`); every other `type` is kept
//! as [`Part::Other`] with its raw JSON so nothing the server sends is lost.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Millisecond timestamps of a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTime {
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<i64>,
}

/// Message metadata. Fields the client does not model are kept in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub id: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub role: Role,
    #[serde(default)]
    pub time: MessageTime,
    #[serde(rename = "modelID", default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessageInfo {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartTime {
    pub start: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub id: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "messageID")]
    pub message_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthetic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<PartTime>,
}

/// Lifecycle of one tool call, tagged by `status`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolState {
    Pending {
        #[serde(default)]
        input: Value,
    },
    Running {
        #[serde(default)]
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<PartTime>,
    },
    Completed {
        #[serde(default)]
        input: Value,
        #[serde(default)]
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<PartTime>,
    },
    Error {
        #[serde(default)]
        input: Value,
        #[serde(default)]
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<PartTime>,
    },
}

impl ToolState {
    pub fn is_finished(&self) -> bool {
        matches!(self, ToolState::Completed { .. } | ToolState::Error { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolPart {
    pub id: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "messageID")]
    pub message_id: String,
    #[serde(rename = "callID", default)]
    pub call_id: String,
    pub tool: String,
    pub state: ToolState,
}

/// Any part kind without a dedicated variant (reasoning, file, step markers, ...).
#[derive(Clone, Debug, PartialEq)]
pub struct OtherPart {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    pub kind: String,
    /// The full wire object, `type` included.
    pub raw: Value,
}

#[derive(Deserialize)]
struct PartHeader {
    id: String,
    #[serde(rename = "sessionID")]
    session_id: String,
    #[serde(rename = "messageID")]
    message_id: String,
    #[serde(rename = "type")]
    kind: String,
}

/// One part of a message.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum Part {
    Text(TextPart),
    Tool(ToolPart),
    Other(OtherPart),
}

impl Part {
    /// Decodes a part object. `text` and `tool` must match their shape; other types only
    /// need `id`, `sessionID`, `messageID` and `type`.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let header: PartHeader = serde_json::from_value(value.clone())?;
        match header.kind.as_str() {
            "text" => serde_json::from_value(value).map(Part::Text),
            "tool" => serde_json::from_value(value).map(Part::Tool),
            _ => Ok(Part::Other(OtherPart {
                id: header.id,
                session_id: header.session_id,
                message_id: header.message_id,
                kind: header.kind,
                raw: value,
            })),
        }
    }

    /// The wire object of this part, `type` included.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        let (kind, mut value) = match self {
            Part::Text(p) => ("text", serde_json::to_value(p)?),
            Part::Tool(p) => ("tool", serde_json::to_value(p)?),
            Part::Other(p) => return Ok(p.raw.clone()),
        };
        if let Some(obj) = value.as_object_mut() {
            obj.insert("type".to_string(), Value::String(kind.to_string()));
        }
        Ok(value)
    }

    pub fn id(&self) -> &str {
        match self {
            Part::Text(p) => &p.id,
            Part::Tool(p) => &p.id,
            Part::Other(p) => &p.id,
        }
    }

    pub fn message_id(&self) -> &str {
        match self {
            Part::Text(p) => &p.message_id,
            Part::Tool(p) => &p.message_id,
            Part::Other(p) => &p.message_id,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Part::Text(p) => &p.session_id,
            Part::Tool(p) => &p.session_id,
            Part::Other(p) => &p.session_id,
        }
    }

    /// Wire `type` of the part.
    pub fn kind(&self) -> &str {
        match self {
            Part::Text(_) => "text",
            Part::Tool(_) => "tool",
            Part::Other(p) => &p.kind,
        }
    }
}

impl TryFrom<Value> for Part {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Part::from_value(value)
    }
}

impl Serialize for Part {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

/// A message with its parts in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub info: MessageInfo,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(info: MessageInfo) -> Self {
        Self {
            info,
            parts: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Non-empty text payloads, in part order.
    pub fn texts(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) if !t.text.is_empty() => Some(t.text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool parts, in part order.
    pub fn tools(&self) -> Vec<&ToolPart> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Tool(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn has_text_content(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::Text(t) if !t.text.is_empty()))
    }
}
