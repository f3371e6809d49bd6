//! Receipt envelope (workspace_id, epoch, seq) stamped on every event a client reads.
//! EnvelopeState belongs to one subscription and hands out sequence numbers.

/// Identity of the subscription an event was read from.
///
/// `epoch` changes every time the client re-subscribes, so two subscriptions to the same
/// workspace never share an identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Envelope {
    pub workspace_id: String,
    pub epoch: u64,
    /// Arrival order within the subscription; starts at 1.
    pub seq: u64,
}

impl Envelope {
    pub fn new(workspace_id: impl Into<String>, epoch: u64) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            epoch,
            seq: 0,
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    /// True when both envelopes come from the same subscription.
    pub fn same_subscription(&self, other: &Envelope) -> bool {
        self.epoch == other.epoch && self.workspace_id == other.workspace_id
    }
}

/// An event together with the envelope it was received under.
#[derive(Clone, Debug, PartialEq)]
pub struct Stamped<E> {
    pub envelope: Envelope,
    pub event: E,
}

/// Envelope state for one subscription: fixed identity, next sequence number.
#[derive(Debug)]
pub struct EnvelopeState {
    workspace_id: String,
    epoch: u64,
    next_seq: u64,
}

impl EnvelopeState {
    pub fn new(workspace_id: impl Into<String>, epoch: u64) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            epoch,
            next_seq: 1,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Stamps the event and advances the sequence.
    pub fn stamp<E>(&mut self, event: E) -> Stamped<E> {
        let envelope = Envelope::new(self.workspace_id.clone(), self.epoch).with_seq(self.next_seq);
        self.next_seq += 1;
        Stamped { envelope, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_advances_seq_and_keeps_identity() {
        let mut state = EnvelopeState::new("sbx1", 3);
        let a = state.stamp("a");
        let b = state.stamp("b");
        assert_eq!(a.envelope.seq, 1);
        assert_eq!(b.envelope.seq, 2);
        assert_eq!(b.envelope.workspace_id, "sbx1");
        assert_eq!(b.envelope.epoch, 3);
        assert!(a.envelope.same_subscription(&b.envelope));
    }

    #[test]
    fn different_epoch_is_different_subscription() {
        let old = Envelope::new("sbx1", 1);
        let new = Envelope::new("sbx1", 2);
        assert!(!old.same_subscription(&new));
        assert!(!Envelope::new("sbx2", 1).same_subscription(&old));
    }
}
