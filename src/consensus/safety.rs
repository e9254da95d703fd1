use crate::types::{Block, BlockStore, Phase, QuorumCert, ViewNumber};

/// Safety state for one replica: the locked QC and the double-vote guard.
///
/// The lock constrains which branches the replica may vote for; the
/// `(view, phase)` watermark guarantees at most one vote per phase per view.
#[derive(Clone, Debug)]
pub struct SafetyRules {
    locked_qc: Option<QuorumCert>,
    last_voted_view: ViewNumber,
    last_voted_phase: Phase,
}

impl SafetyRules {
    pub fn new() -> Self {
        Self {
            locked_qc: None,
            last_voted_view: 0,
            last_voted_phase: Phase::NewView,
        }
    }

    /// The HotStuff safe-node predicate.
    ///
    /// A block is safe to vote for when it extends the locked block
    /// (safety clause) or its justify QC is from a later view than the
    /// lock (liveness clause). No lock means everything is safe.
    pub fn safe_node(&self, block: &Block, justify_qc: &QuorumCert, store: &BlockStore) -> bool {
        match &self.locked_qc {
            None => true,
            Some(locked) => {
                store.extends(&block.hash, &locked.block_hash) || justify_qc.view > locked.view
            }
        }
    }

    /// Whether a vote for `(view, phase)` respects the voting watermark.
    pub fn may_vote(&self, view: ViewNumber, phase: Phase) -> bool {
        (view, phase) > (self.last_voted_view, self.last_voted_phase)
    }

    /// Advances the watermark after a vote is emitted.
    pub fn record_vote(&mut self, view: ViewNumber, phase: Phase) {
        debug_assert!(self.may_vote(view, phase));
        self.last_voted_view = view;
        self.last_voted_phase = phase;
    }

    /// Replaces the lock if `qc` is at least as recent. Returns whether the
    /// lock moved; lock views never decrease.
    pub fn update_lock(&mut self, qc: QuorumCert) -> bool {
        match &self.locked_qc {
            Some(locked) if qc.view < locked.view => false,
            Some(locked) if qc.view == locked.view && qc.block_hash == locked.block_hash => false,
            _ => {
                self.locked_qc = Some(qc);
                true
            }
        }
    }

    pub fn locked_qc(&self) -> Option<&QuorumCert> {
        self.locked_qc.as_ref()
    }

    pub fn last_voted_view(&self) -> ViewNumber {
        self.last_voted_view
    }
}

impl Default for SafetyRules {
    fn default() -> Self {
        Self::new()
    }
}
