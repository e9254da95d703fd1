use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{Block, BlockHash, Phase, ReplicaId, ViewNumber};

/// A quorum certificate: `N - f` matching votes for a (phase, view, block).
///
/// Signatures are simulated structurally — the signer set stands in for the
/// aggregate signature. The `BTreeSet` makes equality independent of the
/// order votes arrived in.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct QuorumCert {
    pub phase: Phase,
    pub view: ViewNumber,
    pub block_hash: BlockHash,
    pub signers: BTreeSet<ReplicaId>,
}

impl QuorumCert {
    pub fn new(
        phase: Phase,
        view: ViewNumber,
        block_hash: BlockHash,
        signers: BTreeSet<ReplicaId>,
    ) -> Self {
        Self {
            phase,
            view,
            block_hash,
            signers,
        }
    }

    /// The bootstrap certificate for the genesis block. Well-formed by
    /// definition despite its empty signer set.
    pub fn genesis() -> Self {
        Self {
            phase: Phase::Prepare,
            view: 0,
            block_hash: Block::genesis().hash,
            signers: BTreeSet::new(),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.view == 0 && self.signers.is_empty() && self.block_hash == Block::genesis().hash
    }

    /// Structural validity: enough distinct signers (the set type already
    /// guarantees distinctness), or the genesis certificate.
    pub fn is_well_formed(&self, quorum: usize) -> bool {
        self.is_genesis() || self.signers.len() >= quorum
    }

    pub fn signer_count(&self) -> usize {
        self.signers.len()
    }
}

impl std::fmt::Display for QuorumCert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "QC {{ phase: {}, view: {}, block: {}, signers: {} }}",
            self.phase,
            self.view,
            self.block_hash.short(),
            self.signers.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_qc_is_well_formed() {
        let qc = QuorumCert::genesis();
        assert!(qc.is_genesis());
        assert!(qc.is_well_formed(3));
    }

    #[test]
    fn test_quorum_threshold() {
        let hash = BlockHash::from_bytes(b"b1");
        let qc = QuorumCert::new(Phase::Prepare, 1, hash, BTreeSet::from([0, 1, 2]));
        assert!(qc.is_well_formed(3));
        assert!(!qc.is_well_formed(4));
    }

    #[test]
    fn test_signer_order_does_not_affect_equality() {
        let hash = BlockHash::from_bytes(b"b1");
        let a = QuorumCert::new(Phase::Commit, 2, hash, BTreeSet::from([2, 0, 1]));
        let b = QuorumCert::new(Phase::Commit, 2, hash, BTreeSet::from([1, 2, 0]));
        assert_eq!(a, b);
    }
}
