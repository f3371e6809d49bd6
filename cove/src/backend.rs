//! Workspace backend: the OpenCode server running inside one workspace.
//!
//! [`WorkspaceBackend`] is the seam the driver and the facade talk to; every call names the
//! workspace's endpoint (`opencodeUrl`), so one backend value serves all workspaces.
//! [`OpencodeBackend`] is the HTTP + server-sent-events implementation.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use stream_event::LiveEvent;
use url::Url;

use crate::error::ConnectionError;
use crate::message::{Message, MessageInfo, Part};

/// Live events of one subscription, in arrival order.
///
/// A `Decode` item is one bad frame; the stream continues. A `Transport` item ends it.
pub type EventStream = BoxStream<'static, Result<LiveEvent, ConnectionError>>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Model id → model record, as the server reports it.
    #[serde(default)]
    pub models: Map<String, Value>,
}

#[async_trait]
pub trait WorkspaceBackend: Send + Sync {
    /// Opens the live event stream of the workspace at `endpoint`.
    async fn subscribe(&self, endpoint: &str) -> Result<EventStream, ConnectionError>;

    /// Messages of one session, oldest first.
    async fn history(&self, endpoint: &str, session_id: &str)
        -> Result<Vec<Message>, ConnectionError>;

    async fn list_sessions(&self, endpoint: &str) -> Result<Vec<SessionInfo>, ConnectionError>;

    async fn create_session(&self, endpoint: &str) -> Result<SessionInfo, ConnectionError>;

    /// Sends a user text message. Replies arrive on the event stream.
    async fn send_message(
        &self,
        endpoint: &str,
        session_id: &str,
        text: &str,
    ) -> Result<(), ConnectionError>;

    async fn list_providers(&self, endpoint: &str) -> Result<Vec<ProviderInfo>, ConnectionError>;
}

/// Appends path segments to an endpoint URL (segments are percent-encoded).
fn endpoint_url(endpoint: &str, segments: &[&str]) -> Result<Url, ConnectionError> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| ConnectionError::Transport(format!("invalid endpoint {:?}: {}", endpoint, e)))?;
    url.path_segments_mut()
        .map_err(|_| ConnectionError::Transport(format!("endpoint {:?} cannot be a base", endpoint)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[derive(Deserialize)]
struct HistoryEntry {
    info: MessageInfo,
    #[serde(default)]
    parts: Vec<Value>,
}

#[derive(Deserialize)]
struct ProvidersReply {
    #[serde(default)]
    providers: Vec<ProviderInfo>,
}

/// Turns a `text/event-stream` body into live events. Events without data are skipped.
fn decode_events<S, B, E>(bytes: S) -> EventStream
where
    S: futures::Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + 'static,
    E: std::fmt::Display + 'static,
{
    bytes
        .eventsource()
        .filter_map(|item| {
            future::ready(match item {
                Ok(event) if event.data.is_empty() => None,
                Ok(event) => {
                    Some(LiveEvent::from_json(&event.data).map_err(ConnectionError::decode))
                }
                Err(EventStreamError::Transport(e)) => Some(Err(ConnectionError::transport(e))),
                Err(e) => Some(Err(ConnectionError::decode(e))),
            })
        })
        .boxed()
}

/// OpenCode server client.
///
/// - `GET /event` (server-sent events)
/// - `GET|POST /session`
/// - `GET|POST /session/{id}/message`
/// - `GET /config/providers`
pub struct OpencodeBackend {
    client: reqwest::Client,
    timeout: Duration,
}

impl OpencodeBackend {
    /// `timeout` bounds request/response calls; the event stream and message sends are not
    /// bounded (they stay open while the assistant works).
    pub fn new(timeout: Duration) -> Result<Self, ConnectionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(ConnectionError::transport)?;
        Ok(Self::with_client(client, timeout))
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ConnectionError> {
        let res = req.send().await.map_err(ConnectionError::transport)?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let body = res.text().await.unwrap_or_default();
        tracing::warn!(%status, "opencode request failed");
        Err(ConnectionError::Transport(format!(
            "opencode server returned {}: {}",
            status,
            body.trim()
        )))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, ConnectionError> {
        let res = self.send(self.client.get(url).timeout(self.timeout)).await?;
        res.json().await.map_err(ConnectionError::decode)
    }
}

#[async_trait]
impl WorkspaceBackend for OpencodeBackend {
    async fn subscribe(&self, endpoint: &str) -> Result<EventStream, ConnectionError> {
        let url = endpoint_url(endpoint, &["event"])?;
        tracing::debug!(%url, "opening event stream");
        let res = self
            .send(
                self.client
                    .get(url)
                    .header(reqwest::header::ACCEPT, "text/event-stream"),
            )
            .await?;
        Ok(decode_events(res.bytes_stream()))
    }

    async fn history(
        &self,
        endpoint: &str,
        session_id: &str,
    ) -> Result<Vec<Message>, ConnectionError> {
        let url = endpoint_url(endpoint, &["session", session_id, "message"])?;
        let entries: Vec<HistoryEntry> = self.get_json(url).await?;
        let messages = entries
            .into_iter()
            .map(|entry| {
                let parts = entry
                    .parts
                    .into_iter()
                    .filter_map(|raw| match Part::from_value(raw) {
                        Ok(part) => Some(part),
                        Err(e) => {
                            tracing::warn!(message = %entry.info.id, error = %e, "skipping malformed part in history");
                            None
                        }
                    })
                    .collect();
                Message {
                    info: entry.info,
                    parts,
                }
            })
            .collect();
        Ok(messages)
    }

    async fn list_sessions(&self, endpoint: &str) -> Result<Vec<SessionInfo>, ConnectionError> {
        self.get_json(endpoint_url(endpoint, &["session"])?).await
    }

    async fn create_session(&self, endpoint: &str) -> Result<SessionInfo, ConnectionError> {
        let url = endpoint_url(endpoint, &["session"])?;
        let res = self
            .send(self.client.post(url).timeout(self.timeout).json(&json!({})))
            .await?;
        res.json().await.map_err(ConnectionError::decode)
    }

    async fn send_message(
        &self,
        endpoint: &str,
        session_id: &str,
        text: &str,
    ) -> Result<(), ConnectionError> {
        let url = endpoint_url(endpoint, &["session", session_id, "message"])?;
        let body = json!({ "parts": [{ "type": "text", "text": text }] });
        self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    async fn list_providers(&self, endpoint: &str) -> Result<Vec<ProviderInfo>, ConnectionError> {
        let reply: ProvidersReply = self
            .get_json(endpoint_url(endpoint, &["config", "providers"])?)
            .await?;
        Ok(reply.providers)
    }
}
