//! Sandbox workspaces: the set the user owns, which one is active, and how that set is kept
//! in step with the remote provisioning service.
//!
//! - **Model**: [`Workspace`], [`WorkspaceStatus`], [`WorkspaceRequest`].
//! - **Service**: [`ProvisioningService`] (create/list/delete), [`HttpProvisioningService`].
//! - **Reconciliation**: list results merged with locally confirmed mutations ([`reconcile`]).
//! - **Policy**: pure auto-selection / auto-provisioning reducer ([`policy::decide`]).
//! - **Registry**: [`Registry`] owns the state cell and publishes [`RegistryView`]s.

mod error;
mod model;
pub mod policy;
pub mod reconcile;
mod registry;
mod service;
mod validate;

pub use error::WorkspaceError;
pub use model::{DeleteAck, Workspace, WorkspaceRequest, WorkspaceStatus};
pub use policy::{AutoCreateState, DefaultWorkspacePolicy, FixedDefault, NoDefault};
pub use registry::{DeleteOutcome, ListStatus, Registry, RegistryView};
pub use service::{HttpProvisioningService, ProvisioningService};
pub use validate::{validate_branch, validate_repo_url};
