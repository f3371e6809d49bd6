//! # Cove
//!
//! Client-side state for a chat application that talks to OpenCode servers running in
//! per-repository sandbox workspaces.
//!
//! Two halves:
//!
//! - **Workspaces** ([`cove_workspace`]): which sandboxes exist, their provisioning status,
//!   which one is active, and the one-time automatic provisioning of a default workspace.
//! - **Conversation**: an immutable, ordered [`Snapshot`] of messages and their parts, patched
//!   by live events from the active workspace ([`EventDriver`]).
//!
//! [`Cove`] ties both together for a rendering layer: it follows the active workspace,
//! reconnects the live stream when it changes and drops everything scoped to the previous one.
//!
//! ## Main modules
//!
//! - [`message`]: [`Message`], [`MessageInfo`], [`Part`] (text / tool / passthrough).
//! - [`conversation`]: [`Snapshot`] and the pure store operations ([`upsert_message`],
//!   [`upsert_message_part`], [`remove_message`], [`remove_message_part`]).
//! - [`driver`]: [`EventDriver`], [`ConnectionStatus`], [`ConversationView`], [`StaleEvent`].
//! - [`backend`]: [`WorkspaceBackend`] trait and the HTTP/SSE [`OpencodeBackend`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use cove::Cove;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! env_config::load_and_apply("cove", None)?;
//! let settings = env_config::Settings::from_env()?;
//! let cove = Cove::from_settings(&settings)?;
//! cove.refresh().await?;
//! let mut updates = cove.subscribe_conversation();
//! cove.send_message("explain src/main.rs").await?;
//! while updates.changed().await.is_ok() {
//!     for message in updates.borrow().snapshot.messages() {
//!         println!("{:?}: {}", message.info.role, message.texts().join(""));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
mod client;
pub mod conversation;
pub mod driver;
mod error;
pub mod message;

pub use backend::{EventStream, OpencodeBackend, ProviderInfo, SessionInfo, WorkspaceBackend};
pub use client::Cove;
pub use conversation::{
    remove_message, remove_message_part, upsert_message, upsert_message_part, Snapshot,
};
pub use driver::{ConnectionStatus, ConversationView, EventDriver, StaleEvent};
pub use error::{ConnectionError, CoveError};
pub use message::{Message, MessageInfo, Part, Role, TextPart, ToolPart, ToolState};

pub use cove_workspace;
#[cfg(feature = "tracing-init")]
pub use env_config::{init_tracing, LogGuard};
