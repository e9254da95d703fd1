use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::types::{BlockHash, ReplicaId, ViewNumber};

/// One observable action in a simulation run.
///
/// Serializes flat as `{ "timestamp": …, "type": "…", …payload }` — the
/// schema consumed by the dashboard and the metrics layer.
#[derive(Clone, PartialEq, Serialize, Deserialize, Debug)]
pub struct TraceEvent {
    pub timestamp: u64,
    #[serde(flatten)]
    pub kind: TraceKind,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceKind {
    MessageSend {
        sender_id: ReplicaId,
        recipient_id: ReplicaId,
        message_type: String,
        view: ViewNumber,
    },
    MessageReceive {
        sender_id: ReplicaId,
        recipient_id: ReplicaId,
        message_type: String,
        view: ViewNumber,
    },
    MessageDrop {
        sender_id: ReplicaId,
        recipient_id: ReplicaId,
        message_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    VoteSend {
        replica_id: ReplicaId,
        vote_type: String,
        view: ViewNumber,
        block_hash: BlockHash,
    },
    QcFormation {
        replica_id: ReplicaId,
        qc_type: String,
        view: ViewNumber,
        block_hash: BlockHash,
    },
    Proposal {
        replica_id: ReplicaId,
        view: ViewNumber,
        block_hash: BlockHash,
    },
    LockUpdate {
        replica_id: ReplicaId,
        locked_view: ViewNumber,
        block_hash: BlockHash,
    },
    Commit {
        replica_id: ReplicaId,
        height: u64,
        block_hash: BlockHash,
        latency_ms: u64,
    },
    Timeout {
        replica_id: ReplicaId,
        view: ViewNumber,
    },
    ViewChange {
        replica_id: ReplicaId,
        new_view: ViewNumber,
    },
    ByzantineAction {
        replica_id: ReplicaId,
        action: String,
    },
}

impl TraceEvent {
    pub fn new(timestamp: u64, kind: TraceKind) -> Self {
        Self { timestamp, kind }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            TraceKind::MessageSend { .. } => "MESSAGE_SEND",
            TraceKind::MessageReceive { .. } => "MESSAGE_RECEIVE",
            TraceKind::MessageDrop { .. } => "MESSAGE_DROP",
            TraceKind::VoteSend { .. } => "VOTE_SEND",
            TraceKind::QcFormation { .. } => "QC_FORMATION",
            TraceKind::Proposal { .. } => "PROPOSAL",
            TraceKind::LockUpdate { .. } => "LOCK_UPDATE",
            TraceKind::Commit { .. } => "COMMIT",
            TraceKind::Timeout { .. } => "TIMEOUT",
            TraceKind::ViewChange { .. } => "VIEW_CHANGE",
            TraceKind::ByzantineAction { .. } => "BYZANTINE_ACTION",
        }
    }
}

/// Append-only log of every trace event in a run.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<TraceEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn append(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events appended since `mark`, for incremental `run` responses.
    pub fn since(&self, mark: usize) -> &[TraceEvent] {
        &self.events[mark.min(self.events.len())..]
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(&self.events)?)
    }
}
