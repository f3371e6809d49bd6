//! Merging a list result with mutations the client has already seen confirmed.
//!
//! A list call and a create/delete may race: the list can be answered from state that
//! predates the mutation. Every confirmed mutation is recorded with the registry generation
//! it produced; every list call remembers the generation current when it was issued. A list
//! only supersedes mutations confirmed *before* it was issued. Newer mutations stay applied
//! on top of it until a later list takes over.

use std::collections::HashSet;

use crate::Workspace;

#[derive(Clone, Debug)]
struct Confirmed<T> {
    generation: u64,
    value: T,
}

/// Creates and deletes confirmed by the service but not yet reflected by a list that was
/// issued after them.
#[derive(Clone, Debug, Default)]
pub struct PendingMutations {
    created: Vec<Confirmed<Workspace>>,
    deleted: Vec<Confirmed<String>>,
}

impl PendingMutations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_create(&mut self, generation: u64, workspace: Workspace) {
        self.created.retain(|c| c.value.id != workspace.id);
        self.deleted.retain(|d| d.value != workspace.id);
        self.created.push(Confirmed {
            generation,
            value: workspace,
        });
    }

    pub fn record_delete(&mut self, generation: u64, id: &str) {
        self.created.retain(|c| c.value.id != id);
        self.deleted.retain(|d| d.value != id);
        self.deleted.push(Confirmed {
            generation,
            value: id.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty()
    }

    pub fn is_deleted(&self, id: &str) -> bool {
        self.deleted.iter().any(|d| d.value == id)
    }

    /// Drops every mutation that a list issued at `list_generation` already covers.
    fn retire(&mut self, list_generation: u64) {
        self.created.retain(|c| c.generation > list_generation);
        self.deleted.retain(|d| d.generation > list_generation);
    }
}

/// Builds the new workspace list from a list result.
///
/// - Mutations confirmed at or before `list_generation` are retired; the list is authoritative
///   for them.
/// - Newer confirmed deletes hide their id; newer confirmed creates are appended when the list
///   does not have them yet.
/// - An entry whose `updatedAt` is older than the copy already known is a stale read; the known
///   copy is kept.
/// - Duplicate ids in the list keep their first occurrence.
pub fn merge_list(
    known: &[Workspace],
    listed: Vec<Workspace>,
    pending: &mut PendingMutations,
    list_generation: u64,
) -> Vec<Workspace> {
    pending.retire(list_generation);

    let mut seen = HashSet::new();
    let mut merged: Vec<Workspace> = Vec::with_capacity(listed.len());
    for incoming in listed {
        if !seen.insert(incoming.id.clone()) || pending.is_deleted(&incoming.id) {
            continue;
        }
        merged.push(newest(known, incoming));
    }

    for created in &pending.created {
        if seen.insert(created.value.id.clone()) {
            let current = known
                .iter()
                .find(|k| k.id == created.value.id)
                .cloned()
                .unwrap_or_else(|| created.value.clone());
            merged.push(current);
        }
    }
    merged
}

fn newest(known: &[Workspace], incoming: Workspace) -> Workspace {
    let Some(prev) = known.iter().find(|k| k.id == incoming.id) else {
        return incoming;
    };
    if incoming.updated_at < prev.updated_at {
        tracing::debug!(id = %incoming.id, "ignoring stale workspace record from list");
        return prev.clone();
    }
    if !prev.status.can_transition_to(incoming.status) {
        tracing::warn!(
            id = %incoming.id,
            from = ?prev.status,
            to = ?incoming.status,
            "provisioning service reported a backward status transition"
        );
    }
    incoming
}
