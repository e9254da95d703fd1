pub mod block;
pub mod hash;
pub mod quorum_cert;

pub use block::{Block, BlockStore};
pub use hash::BlockHash;
pub use quorum_cert::QuorumCert;

use serde::{Deserialize, Serialize};

/// Monotonically increasing epoch number. Each view has a unique leader.
pub type ViewNumber = u64;

/// Stable replica identifier in `[0, N)`.
pub type ReplicaId = u64;

/// One step of the HotStuff voting cascade.
///
/// The declaration order matters: votes are guarded by lexicographic
/// `(view, phase)` comparison, so `Prepare < PreCommit < Commit` must hold.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Debug)]
pub enum Phase {
    NewView,
    Prepare,
    PreCommit,
    Commit,
    Decide,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::NewView => "NEW_VIEW",
            Phase::Prepare => "PREPARE",
            Phase::PreCommit => "PRE_COMMIT",
            Phase::Commit => "COMMIT",
            Phase::Decide => "DECIDE",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering() {
        assert!(Phase::Prepare < Phase::PreCommit);
        assert!(Phase::PreCommit < Phase::Commit);
        assert!(Phase::Commit < Phase::Decide);
        assert!((2, Phase::Prepare) > (1, Phase::Commit));
    }
}
