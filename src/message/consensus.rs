use serde::{Deserialize, Serialize};

use crate::types::{Block, BlockHash, Phase, QuorumCert, ReplicaId, ViewNumber};

/// All protocol messages. Exhaustively matched on the receiving side; an
/// unknown variant is a compile error, not a runtime one.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum Message {
    Proposal(Proposal),
    Vote(Vote),
    NewView(NewView),
    Timeout(Timeout),
}

/// A leader's phase-p proposal, justified by a QC from the prior phase.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct Proposal {
    pub phase: Phase,
    pub block: Block,
    pub justify_qc: QuorumCert,
}

/// A replica's vote for (phase, view, block), addressed to the collecting
/// leader.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct Vote {
    pub phase: Phase,
    pub view: ViewNumber,
    pub block_hash: BlockHash,
    pub voter: ReplicaId,
}

/// Sent to the leader of a view on entering it, carrying the sender's
/// highest known QC.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct NewView {
    pub view: ViewNumber,
    pub highest_qc: QuorumCert,
}

/// Broadcast when a replica's pacemaker expires in a view. `f + 1` distinct
/// voters for one view let lagging replicas advance without waiting for
/// their own timer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct Timeout {
    pub view: ViewNumber,
    pub voter: ReplicaId,
}

impl Message {
    /// The view this message belongs to, for tracing.
    pub fn view(&self) -> ViewNumber {
        match self {
            Message::Proposal(p) => p.block.view,
            Message::Vote(v) => v.view,
            Message::NewView(nv) => nv.view,
            Message::Timeout(t) => t.view,
        }
    }

    /// Message kind label used in trace payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Proposal(_) => "PROPOSAL",
            Message::Vote(_) => "VOTE",
            Message::NewView(_) => "NEW_VIEW",
            Message::Timeout(_) => "TIMEOUT",
        }
    }
}

/// The network's unit of scheduling. Only messages that survive the drop
/// and partition checks become envelopes; the simulated network owns every
/// in-flight one until delivery.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct Envelope {
    pub send_time: u64,
    pub deliver_time: u64,
    pub sender: ReplicaId,
    pub recipient: ReplicaId,
    pub message: Message,
}
