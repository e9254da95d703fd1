use std::collections::{BTreeSet, HashMap, HashSet};

use crate::types::{BlockHash, Phase, QuorumCert, ReplicaId, ViewNumber};

/// Per-leader vote aggregation: `(phase, view, block_hash)` → signer set.
///
/// Emits a QC exactly once per key, the moment the quorum-th distinct vote
/// arrives; later votes for a retired key are ignored. NewView collection
/// reuses the same mapping under the zero block hash.
#[derive(Clone, Debug)]
pub struct VoteCollector {
    quorum: usize,
    pending: HashMap<(Phase, ViewNumber, BlockHash), BTreeSet<ReplicaId>>,
    formed: HashSet<(Phase, ViewNumber, BlockHash)>,
}

impl VoteCollector {
    pub fn new(quorum: usize) -> Self {
        Self {
            quorum,
            pending: HashMap::new(),
            formed: HashSet::new(),
        }
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Registers one vote. Returns the QC when this vote completes the
    /// quorum; `None` for duplicates, retired keys and sub-quorum counts.
    pub fn add_vote(
        &mut self,
        phase: Phase,
        view: ViewNumber,
        block_hash: BlockHash,
        voter: ReplicaId,
    ) -> Option<QuorumCert> {
        let key = (phase, view, block_hash);
        if self.formed.contains(&key) {
            return None;
        }

        let signers = self.pending.entry(key).or_default();
        if !signers.insert(voter) {
            // No double counting.
            return None;
        }

        if signers.len() >= self.quorum {
            let signers = self.pending.remove(&key).unwrap_or_default();
            self.formed.insert(key);
            return Some(QuorumCert::new(phase, view, block_hash, signers));
        }
        None
    }

    pub fn votes_for(&self, phase: Phase, view: ViewNumber, block_hash: BlockHash) -> usize {
        self.pending
            .get(&(phase, view, block_hash))
            .map_or(0, BTreeSet::len)
    }

    /// Drops pending tallies for views before `view`. Retired keys are kept
    /// so a straggler vote can never re-form an old QC.
    pub fn gc_before(&mut self, view: ViewNumber) {
        self.pending.retain(|(_, v, _), _| *v >= view);
    }
}
