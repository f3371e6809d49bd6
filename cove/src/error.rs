//! Errors surfaced by the live connection and by the [`crate::Cove`] facade.

use cove_workspace::WorkspaceError;
use thiserror::Error;

/// Failure talking to a workspace's OpenCode server.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// Network failure, non-success status, or the stream broke.
    #[error("connection: {0}")]
    Transport(String),
    /// The server sent something that is not the expected JSON.
    #[error("decode: {0}")]
    Decode(String),
}

impl ConnectionError {
    pub(crate) fn transport(e: impl std::fmt::Display) -> Self {
        ConnectionError::Transport(e.to_string())
    }

    pub(crate) fn decode(e: impl std::fmt::Display) -> Self {
        ConnectionError::Decode(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CoveError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("no active workspace")]
    NoActiveWorkspace,
    /// The active workspace has no live endpoint yet (still initializing or cloning).
    #[error("workspace {0} is not ready")]
    WorkspaceNotReady(String),
    /// The active workspace changed while the request was in flight; its answer was dropped.
    #[error("active workspace changed during request")]
    WorkspaceChanged,
}
