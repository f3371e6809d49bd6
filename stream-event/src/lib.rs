//! Live-connection event protocol for a workspace's coding-assistant server.
//!
//! This crate defines the wire shape of one event (`{"type": ..., "properties": {...}}`)
//! and the receipt envelope a client stamps on every event it receives.
//! It does not depend on cove. Cove decodes message/part payloads out of [`LiveEvent`].

pub mod envelope;
pub mod event;

pub use envelope::{Envelope, EnvelopeState, Stamped};
pub use event::LiveEvent;
