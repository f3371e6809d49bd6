//! Typed client settings read from `COVE_*` environment variables.

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PROVISIONING_URL: &str = "http://127.0.0.1:8787";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_LOCAL_WORKSPACE_ID: &str = "local";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SettingsError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Everything the client needs to reach the provisioning service and pick defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// `COVE_PROVISIONING_URL`: base URL of the provisioning service.
    pub provisioning_url: String,
    /// `COVE_API_TOKEN`: bearer token sent to the provisioning service, if any.
    pub api_token: Option<String>,
    /// `COVE_DEFAULT_REPO_URL`: repository auto-provisioned when no workspace exists.
    /// Unset disables auto-provisioning.
    pub default_repo_url: Option<String>,
    /// `COVE_DEFAULT_BRANCH`
    pub default_branch: String,
    /// `COVE_LOCAL_WORKSPACE_ID`: reserved id of the non-sandboxed local workspace.
    pub local_workspace_id: String,
    /// `COVE_REQUEST_TIMEOUT_SECS`
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provisioning_url: DEFAULT_PROVISIONING_URL.to_string(),
            api_token: None,
            default_repo_url: None,
            default_branch: DEFAULT_BRANCH.to_string(),
            local_workspace_id: DEFAULT_LOCAL_WORKSPACE_ID.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Reads settings from the process environment. Call [`crate::load_and_apply`] first
    /// so `.env` and XDG values are visible.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Settings::default();

        let request_timeout = match get("COVE_REQUEST_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|e: std::num::ParseIntError| {
                    SettingsError::Invalid {
                        key: "COVE_REQUEST_TIMEOUT_SECS",
                        message: e.to_string(),
                    }
                })?;
                if secs == 0 {
                    return Err(SettingsError::Invalid {
                        key: "COVE_REQUEST_TIMEOUT_SECS",
                        message: "must be greater than zero".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => defaults.request_timeout,
        };

        Ok(Self {
            provisioning_url: get("COVE_PROVISIONING_URL").unwrap_or(defaults.provisioning_url),
            api_token: get("COVE_API_TOKEN"),
            default_repo_url: get("COVE_DEFAULT_REPO_URL"),
            default_branch: get("COVE_DEFAULT_BRANCH").unwrap_or(defaults.default_branch),
            local_workspace_id: get("COVE_LOCAL_WORKSPACE_ID")
                .unwrap_or(defaults.local_workspace_id),
            request_timeout,
        })
    }
}
