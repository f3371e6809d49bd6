//! Workspace-layer errors.

/// Failure of a registry or provisioning operation.
///
/// `Transport` means "we don't know the state": callers keep what they had and may retry.
/// It is never folded into an empty result.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WorkspaceError {
    /// Malformed input (bad repository URL, empty branch). Never retried.
    #[error("invalid input: {0}")]
    Validation(String),
    /// The service does not know this id.
    #[error("workspace not found: {0}")]
    NotFound(String),
    /// Network, auth, or service failure.
    #[error("transport: {0}")]
    Transport(String),
}

impl WorkspaceError {
    /// True for failures a user-triggered retry may fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkspaceError::Transport(_))
    }
}
