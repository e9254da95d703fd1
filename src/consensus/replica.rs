use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::config::{FaultType, SimConfig};
use crate::consensus::pacemaker::{build_pacemaker, LeaderSchedule, Pacemaker};
use crate::consensus::safety::SafetyRules;
use crate::consensus::votes::VoteCollector;
use crate::error::SimError;
use crate::message::{Message, NewView, Proposal, Timeout, Vote};
use crate::sim::rng::SimRng;
use crate::trace::{TraceEvent, TraceKind};
use crate::types::{Block, BlockHash, BlockStore, Phase, QuorumCert, ReplicaId, ViewNumber};

/// Where an outgoing message goes.
#[derive(Clone, Debug)]
pub enum Destination {
    One(ReplicaId),
    All,
}

/// Timer requests a handler hands back to the driver.
#[derive(Clone, Debug)]
pub enum TimerOp {
    /// Arm the pacemaker timer for `view`.
    Schedule { view: ViewNumber, deadline: u64 },
    /// Cancel outstanding timers for views before `view`.
    CancelBefore { view: ViewNumber },
}

/// Everything a handler wants done to the outside world. Handlers never
/// touch the queue or network directly; the driver routes these.
#[derive(Debug, Default)]
pub struct Actions {
    pub outbound: Vec<(Destination, Message)>,
    pub timers: Vec<TimerOp>,
    pub trace: Vec<TraceEvent>,
}

impl Actions {
    fn new() -> Self {
        Self::default()
    }
}

/// Snapshot of one replica's externally visible state.
#[derive(Clone, Serialize, Debug)]
pub struct ReplicaSnapshot {
    pub replica_id: ReplicaId,
    pub current_view: ViewNumber,
    pub current_phase: Phase,
    pub locked_qc: Option<QuorumCert>,
    pub prepare_qc: Option<QuorumCert>,
    pub committed_count: usize,
    pub last_voted_view: ViewNumber,
    pub is_leader: bool,
    pub is_faulty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault_type: Option<FaultType>,
}

/// The HotStuff state machine for one replica.
///
/// Driven entirely by delivered messages and timer events; every handler
/// returns the messages, timers and trace events it produced. In basic mode
/// the four phases run inside one view; in chained mode each view carries
/// one generic phase and commits trail by two views.
#[derive(Debug)]
pub struct Replica {
    id: ReplicaId,
    num_replicas: usize,
    quorum: usize,
    max_faulty: usize,
    chained: bool,
    max_views: Option<ViewNumber>,
    schedule: LeaderSchedule,

    current_view: ViewNumber,
    current_phase: Phase,
    safety: SafetyRules,
    prepare_qc: Option<QuorumCert>,
    highest_qc: QuorumCert,

    store: BlockStore,
    /// Highest QC observed for each block, for the chained lock/commit walk.
    qc_by_block: HashMap<BlockHash, QuorumCert>,
    collector: VoteCollector,
    timeout_tally: BTreeMap<ViewNumber, BTreeSet<ReplicaId>>,

    committed: Vec<BlockHash>,
    committed_set: HashSet<BlockHash>,
    last_committed: BlockHash,
    /// When this replica first saw each block proposed, for commit latency.
    proposal_received_at: HashMap<BlockHash, u64>,

    pacemaker: Box<dyn Pacemaker>,
    payload_seq: u64,
    proposed_views: BTreeSet<ViewNumber>,

    fault: FaultType,
    fault_drop_probability: f64,
    fault_rng: SimRng,
}

impl Replica {
    pub fn new(id: ReplicaId, config: &SimConfig, fault: FaultType, fault_rng: SimRng) -> Self {
        let store = BlockStore::new();
        Self {
            id,
            num_replicas: config.num_replicas,
            quorum: config.quorum_size(),
            max_faulty: config.max_faulty(),
            chained: config.chained,
            max_views: config.max_views,
            schedule: LeaderSchedule::new(config.num_replicas),
            current_view: 0,
            current_phase: Phase::NewView,
            safety: SafetyRules::new(),
            prepare_qc: None,
            highest_qc: QuorumCert::genesis(),
            last_committed: store.genesis_hash(),
            store,
            qc_by_block: HashMap::new(),
            collector: VoteCollector::new(config.quorum_size()),
            timeout_tally: BTreeMap::new(),
            committed: Vec::new(),
            committed_set: HashSet::new(),
            proposal_received_at: HashMap::new(),
            pacemaker: build_pacemaker(config),
            payload_seq: 0,
            proposed_views: BTreeSet::new(),
            fault,
            fault_drop_probability: config.fault_drop_probability,
            fault_rng,
        }
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    pub fn current_view(&self) -> ViewNumber {
        self.current_view
    }

    pub fn is_faulty(&self) -> bool {
        self.fault != FaultType::None
    }

    pub fn is_crashed(&self) -> bool {
        self.fault == FaultType::Crash
    }

    pub fn committed_chain(&self) -> &[BlockHash] {
        &self.committed
    }

    pub fn block(&self, hash: &BlockHash) -> Option<&Block> {
        self.store.get(hash)
    }

    pub fn snapshot(&self) -> ReplicaSnapshot {
        ReplicaSnapshot {
            replica_id: self.id,
            current_view: self.current_view,
            current_phase: self.current_phase,
            locked_qc: self.safety.locked_qc().cloned(),
            prepare_qc: self.prepare_qc.clone(),
            committed_count: self.committed.len(),
            last_voted_view: self.safety.last_voted_view(),
            is_leader: self.schedule.leader_of(self.current_view) == self.id,
            is_faulty: self.is_faulty(),
            fault_type: if self.is_faulty() {
                Some(self.fault)
            } else {
                None
            },
        }
    }

    /// Bootstraps the replica into view 1. Called once by the driver at
    /// reset; everything after this flows through the event queue.
    pub fn start(&mut self, now: u64) -> Actions {
        let mut actions = Actions::new();
        match self.fault {
            FaultType::Crash => {
                actions.trace.push(TraceEvent::new(
                    now,
                    TraceKind::ByzantineAction {
                        replica_id: self.id,
                        action: "crash".to_string(),
                    },
                ));
                return actions;
            }
            FaultType::Silent => {
                actions.trace.push(TraceEvent::new(
                    now,
                    TraceKind::ByzantineAction {
                        replica_id: self.id,
                        action: "silent".to_string(),
                    },
                ));
            }
            _ => {}
        }
        self.enter_view(now, 1, true, &mut actions);
        self.finalize(now, actions)
    }

    /// A pacemaker timer fired. Timers for views the replica already left
    /// are no-ops.
    pub fn on_timer(&mut self, now: u64, view: ViewNumber) -> Actions {
        let mut actions = Actions::new();
        if self.is_crashed() || view < self.current_view {
            return actions;
        }

        debug!(replica = self.id, view, "pacemaker timeout");
        actions.trace.push(TraceEvent::new(
            now,
            TraceKind::Timeout {
                replica_id: self.id,
                view,
            },
        ));
        actions.outbound.push((
            Destination::All,
            Message::Timeout(Timeout {
                view,
                voter: self.id,
            }),
        ));

        let next = self.pacemaker.on_timeout();
        self.advance_to(now, next, true, &mut actions);
        self.finalize(now, actions)
    }

    /// A message arrived. The driver has already recorded the receive.
    pub fn on_message(
        &mut self,
        now: u64,
        sender: ReplicaId,
        message: Message,
    ) -> Result<Actions, SimError> {
        let mut actions = Actions::new();
        if self.is_crashed() {
            return Ok(actions);
        }

        match message {
            Message::Proposal(proposal) => {
                self.on_proposal(now, sender, proposal, &mut actions)?
            }
            Message::Vote(vote) => self.on_vote(now, sender, vote, &mut actions),
            Message::NewView(new_view) => self.on_new_view(now, sender, new_view, &mut actions),
            Message::Timeout(timeout) => self.on_timeout_msg(now, sender, timeout, &mut actions),
        }
        Ok(self.finalize(now, actions))
    }

    fn on_proposal(
        &mut self,
        now: u64,
        sender: ReplicaId,
        proposal: Proposal,
        actions: &mut Actions,
    ) -> Result<(), SimError> {
        let view = proposal.block.view;
        if view < self.current_view {
            return Ok(());
        }
        if let Err(reason) = self.check_proposal(&proposal, sender) {
            let error = SimError::InvalidMessage(reason.to_string());
            actions.trace.push(TraceEvent::new(
                now,
                TraceKind::MessageDrop {
                    sender_id: sender,
                    recipient_id: self.id,
                    message_type: "PROPOSAL".to_string(),
                    reason: Some(error.to_string()),
                },
            ));
            return Ok(());
        }

        self.observe_qc(proposal.justify_qc.clone());
        if view > self.current_view {
            // The justify QC is the evidence that lets a lagging replica
            // join the in-flight view.
            self.advance_to(now, view, false, actions);
        }

        self.store.insert(proposal.block.clone());
        let block_hash = proposal.block.hash;
        if proposal.phase == Phase::Prepare {
            self.proposal_received_at.entry(block_hash).or_insert(now);
        }

        if self.chained {
            self.on_chained_proposal(now, &proposal, actions)?;
            return Ok(());
        }

        match proposal.phase {
            Phase::Prepare => {}
            Phase::PreCommit => {
                self.set_prepare_qc(proposal.justify_qc.clone());
            }
            Phase::Commit => {
                if self.safety.update_lock(proposal.justify_qc.clone()) {
                    actions.trace.push(TraceEvent::new(
                        now,
                        TraceKind::LockUpdate {
                            replica_id: self.id,
                            locked_view: proposal.justify_qc.view,
                            block_hash: proposal.justify_qc.block_hash,
                        },
                    ));
                }
            }
            Phase::Decide => {
                self.commit_chain(now, &proposal.justify_qc, actions)?;
                self.advance_to(now, view + 1, true, actions);
                return Ok(());
            }
            Phase::NewView => unreachable!("proposals are never NewView-phase"),
        }

        self.maybe_vote(now, &proposal, actions);
        Ok(())
    }

    /// Chained mode: one generic phase per view. A proposal at view v
    /// pre-commits v-1 (lock) and decides v-2 (commit) through parent
    /// links at consecutive views.
    fn on_chained_proposal(
        &mut self,
        now: u64,
        proposal: &Proposal,
        actions: &mut Actions,
    ) -> Result<(), SimError> {
        let block = &proposal.block;
        let justify = &proposal.justify_qc;
        self.set_prepare_qc(justify.clone());

        // One-chain below the justify block: lock its parent.
        if let Some(parent) = self.store.get(&justify.block_hash).cloned() {
            if !parent.is_genesis() {
                if let Some(grandparent) = self.store.get(&parent.parent_hash).cloned() {
                    let consecutive_pair = grandparent.view + 1 == parent.view;
                    if consecutive_pair {
                        if let Some(gp_qc) = self.qc_by_block.get(&grandparent.hash).cloned() {
                            if self.safety.update_lock(gp_qc.clone()) {
                                actions.trace.push(TraceEvent::new(
                                    now,
                                    TraceKind::LockUpdate {
                                        replica_id: self.id,
                                        locked_view: gp_qc.view,
                                        block_hash: gp_qc.block_hash,
                                    },
                                ));
                            }
                            // Three blocks at consecutive views: the oldest
                            // of the chain commits.
                            if parent.view + 1 == block.view {
                                self.commit_chain(now, &gp_qc, actions)?;
                            }
                        }
                    }
                }
            }
        }

        self.maybe_vote(now, proposal, actions);
        Ok(())
    }

    /// Structural admission checks for a proposal. Failures are data, not
    /// errors: the caller traces a drop and moves on.
    fn check_proposal(&self, proposal: &Proposal, sender: ReplicaId) -> Result<(), &'static str> {
        let block = &proposal.block;
        let justify = &proposal.justify_qc;
        let leader = self.schedule.leader_of(block.view);

        if sender != leader || block.proposer != leader {
            return Err("proposal not from the view leader");
        }
        if !justify.is_well_formed(self.quorum) {
            return Err("justify QC below quorum");
        }
        if justify.view > block.view {
            return Err("justify QC from a future view");
        }

        if self.chained {
            if proposal.phase != Phase::Prepare {
                return Err("chained proposals carry the generic phase");
            }
            if block.parent_hash != justify.block_hash {
                return Err("block does not extend its justify QC");
            }
            let Some(parent) = self.store.get(&block.parent_hash) else {
                return Err("unknown parent block");
            };
            if block.height != parent.height + 1 {
                return Err("height does not extend parent");
            }
            return Ok(());
        }

        match proposal.phase {
            Phase::Prepare => {
                if justify.phase != Phase::Prepare {
                    return Err("prepare justify must be a prepare QC");
                }
                if block.parent_hash != justify.block_hash {
                    return Err("block does not extend its justify QC");
                }
                let Some(parent) = self.store.get(&block.parent_hash) else {
                    return Err("unknown parent block");
                };
                if block.height != parent.height + 1 {
                    return Err("height does not extend parent");
                }
                Ok(())
            }
            Phase::PreCommit | Phase::Commit | Phase::Decide => {
                let expected = match proposal.phase {
                    Phase::PreCommit => Phase::Prepare,
                    Phase::Commit => Phase::PreCommit,
                    _ => Phase::Commit,
                };
                if justify.phase != expected {
                    return Err("justify QC from the wrong phase");
                }
                if justify.view != block.view || justify.block_hash != block.hash {
                    return Err("justify QC does not certify this proposal");
                }
                Ok(())
            }
            Phase::NewView => Err("proposals are never NewView-phase"),
        }
    }

    /// Votes for the proposal if the safety rules allow it; silently
    /// ignores it otherwise.
    fn maybe_vote(&mut self, now: u64, proposal: &Proposal, actions: &mut Actions) {
        let block = &proposal.block;
        let view = block.view;
        if view != self.current_view {
            return;
        }
        if !self.safety.safe_node(block, &proposal.justify_qc, &self.store) {
            debug!(replica = self.id, view, "unsafe proposal ignored");
            return;
        }
        if !self.safety.may_vote(view, proposal.phase) {
            return;
        }

        self.safety.record_vote(view, proposal.phase);
        self.current_phase = proposal.phase;

        let recipient = if self.chained {
            self.schedule.leader_of(view + 1)
        } else {
            self.schedule.leader_of(view)
        };
        actions.trace.push(TraceEvent::new(
            now,
            TraceKind::VoteSend {
                replica_id: self.id,
                vote_type: proposal.phase.as_str().to_string(),
                view,
                block_hash: block.hash,
            },
        ));
        actions.outbound.push((
            Destination::One(recipient),
            Message::Vote(Vote {
                phase: proposal.phase,
                view,
                block_hash: block.hash,
                voter: self.id,
            }),
        ));
    }

    fn on_vote(&mut self, now: u64, sender: ReplicaId, vote: Vote, actions: &mut Actions) {
        if sender != vote.voter {
            return;
        }
        // Only the collecting leader for this vote's view tallies it.
        let collecting_leader = if self.chained {
            self.schedule.leader_of(vote.view + 1)
        } else {
            self.schedule.leader_of(vote.view)
        };
        if collecting_leader != self.id {
            return;
        }
        // Votes for a view this replica already left cannot form a useful QC.
        let stale = if self.chained {
            vote.view + 1 < self.current_view
        } else {
            vote.view < self.current_view
        };
        if stale {
            return;
        }

        let Some(qc) = self
            .collector
            .add_vote(vote.phase, vote.view, vote.block_hash, vote.voter)
        else {
            return;
        };

        actions.trace.push(TraceEvent::new(
            now,
            TraceKind::QcFormation {
                replica_id: self.id,
                qc_type: qc.phase.as_str().to_string(),
                view: qc.view,
                block_hash: qc.block_hash,
            },
        ));
        self.observe_qc(qc.clone());

        if self.chained {
            // The freshly formed QC is the leader's cue to open the next
            // view and propose on top of it.
            if qc.view + 1 >= self.current_view {
                if qc.view + 1 > self.current_view {
                    self.advance_to(now, qc.view + 1, false, actions);
                }
                self.try_propose(now, qc.view + 1, actions);
            }
            return;
        }

        if qc.view < self.current_view {
            return;
        }
        if qc.view > self.current_view {
            self.advance_to(now, qc.view, false, actions);
        }

        let Some(block) = self.store.get(&qc.block_hash).cloned() else {
            return;
        };
        let next_phase = match qc.phase {
            Phase::Prepare => {
                self.set_prepare_qc(qc.clone());
                Phase::PreCommit
            }
            Phase::PreCommit => Phase::Commit,
            Phase::Commit => Phase::Decide,
            Phase::NewView | Phase::Decide => return,
        };
        actions.outbound.push((
            Destination::All,
            Message::Proposal(Proposal {
                phase: next_phase,
                block,
                justify_qc: qc,
            }),
        ));
    }

    fn on_new_view(&mut self, now: u64, sender: ReplicaId, new_view: NewView, actions: &mut Actions) {
        if !new_view.highest_qc.is_well_formed(self.quorum) {
            let error = SimError::InvalidMessage("highest QC below quorum".to_string());
            actions.trace.push(TraceEvent::new(
                now,
                TraceKind::MessageDrop {
                    sender_id: sender,
                    recipient_id: self.id,
                    message_type: "NEW_VIEW".to_string(),
                    reason: Some(error.to_string()),
                },
            ));
            return;
        }
        self.observe_qc(new_view.highest_qc.clone());

        if self.schedule.leader_of(new_view.view) != self.id || new_view.view < self.current_view {
            return;
        }

        // NewView aggregation is the (NewView, view) row of the pending-vote
        // table, keyed by the zero hash.
        if self
            .collector
            .add_vote(Phase::NewView, new_view.view, BlockHash::zero(), sender)
            .is_some()
        {
            if new_view.view > self.current_view {
                self.advance_to(now, new_view.view, false, actions);
            }
            self.try_propose(now, new_view.view, actions);
        }
    }

    fn on_timeout_msg(
        &mut self,
        now: u64,
        sender: ReplicaId,
        timeout: Timeout,
        actions: &mut Actions,
    ) {
        if sender != timeout.voter || timeout.view < self.current_view {
            return;
        }
        let tally = self.timeout_tally.entry(timeout.view).or_default();
        tally.insert(timeout.voter);
        // f + 1 timeouts for one view mean at least one honest replica gave
        // up on it; follow without waiting for our own timer.
        if tally.len() > self.max_faulty {
            let next = timeout.view + 1;
            self.pacemaker.on_timeout();
            self.advance_to(now, next, true, actions);
        }
    }

    /// Proposes in `view` if this replica leads it and has not proposed yet.
    /// Views past the configured horizon get no new proposals.
    fn try_propose(&mut self, now: u64, view: ViewNumber, actions: &mut Actions) {
        if self.schedule.leader_of(view) != self.id
            || self.current_view != view
            || self.proposed_views.contains(&view)
        {
            return;
        }
        if self.max_views.is_some_and(|horizon| view > horizon) {
            return;
        }
        let Some(parent) = self.store.get(&self.highest_qc.block_hash).cloned() else {
            debug!(replica = self.id, view, "cannot propose: justify block unknown");
            return;
        };

        self.proposed_views.insert(view);

        if self.fault == FaultType::ByzantineEquivocate {
            self.equivocate(now, view, &parent, actions);
            return;
        }

        self.payload_seq += 1;
        let block = Block::new(
            parent.hash,
            view,
            parent.height + 1,
            self.id,
            self.payload_seq,
        );
        debug!(replica = self.id, view, block = %block, "proposing");
        actions.trace.push(TraceEvent::new(
            now,
            TraceKind::Proposal {
                replica_id: self.id,
                view,
                block_hash: block.hash,
            },
        ));
        actions.outbound.push((
            Destination::All,
            Message::Proposal(Proposal {
                phase: Phase::Prepare,
                block,
                justify_qc: self.highest_qc.clone(),
            }),
        ));
    }

    /// Leader-side equivocation: two conflicting blocks for the same view,
    /// one to each half of the replica set.
    fn equivocate(&mut self, now: u64, view: ViewNumber, parent: &Block, actions: &mut Actions) {
        self.payload_seq += 2;
        let left = Block::new(
            parent.hash,
            view,
            parent.height + 1,
            self.id,
            self.payload_seq - 1,
        );
        let right = Block::new(
            parent.hash,
            view,
            parent.height + 1,
            self.id,
            self.payload_seq,
        );
        actions.trace.push(TraceEvent::new(
            now,
            TraceKind::ByzantineAction {
                replica_id: self.id,
                action: format!("equivocate_proposal view {}", view),
            },
        ));
        for block in [&left, &right] {
            actions.trace.push(TraceEvent::new(
                now,
                TraceKind::Proposal {
                    replica_id: self.id,
                    view,
                    block_hash: block.hash,
                },
            ));
        }

        let half = (self.num_replicas as ReplicaId).div_ceil(2);
        for recipient in 0..self.num_replicas as ReplicaId {
            let block = if recipient < half { &left } else { &right };
            actions.outbound.push((
                Destination::One(recipient),
                Message::Proposal(Proposal {
                    phase: Phase::Prepare,
                    block: block.clone(),
                    justify_qc: self.highest_qc.clone(),
                }),
            ));
        }
    }

    /// Commits the certified block and every uncommitted ancestor, oldest
    /// first. A certified block that conflicts with the committed prefix is
    /// an implementation bug, not a tolerated fault.
    fn commit_chain(
        &mut self,
        now: u64,
        qc: &QuorumCert,
        actions: &mut Actions,
    ) -> Result<(), SimError> {
        if self.committed_set.contains(&qc.block_hash) {
            return Ok(());
        }

        let mut chain = Vec::new();
        let mut cursor = qc.block_hash;
        while cursor != self.last_committed {
            let Some(block) = self.store.get(&cursor) else {
                // Missing ancestry: this replica cannot execute yet.
                debug!(replica = self.id, "commit deferred: missing ancestor");
                return Ok(());
            };
            if block.is_genesis() {
                return Err(SimError::ProtocolViolation(format!(
                    "replica {} asked to commit {} which does not extend committed head {}",
                    self.id,
                    qc.block_hash.short(),
                    self.last_committed.short()
                )));
            }
            chain.push(block.clone());
            cursor = block.parent_hash;
        }
        chain.reverse();

        let decide_latency = now.saturating_sub(
            self.proposal_received_at
                .get(&qc.block_hash)
                .copied()
                .unwrap_or(now),
        );
        for block in &chain {
            let received = self
                .proposal_received_at
                .get(&block.hash)
                .copied()
                .unwrap_or(now);
            self.committed.push(block.hash);
            self.committed_set.insert(block.hash);
            actions.trace.push(TraceEvent::new(
                now,
                TraceKind::Commit {
                    replica_id: self.id,
                    height: block.height,
                    block_hash: block.hash,
                    latency_ms: now.saturating_sub(received),
                },
            ));
        }
        self.last_committed = qc.block_hash;
        self.pacemaker.on_commit(decide_latency);
        Ok(())
    }

    /// Enters `view`: phase reset, pacemaker re-armed, stale timers and
    /// tallies dropped, and (when asked) a NewView to the view's leader.
    fn enter_view(&mut self, now: u64, view: ViewNumber, notify_leader: bool, actions: &mut Actions) {
        self.current_view = view;
        self.current_phase = Phase::NewView;
        self.pacemaker.on_enter_view(view);
        self.collector.gc_before(view);
        self.timeout_tally = self.timeout_tally.split_off(&view);

        actions.timers.push(TimerOp::CancelBefore { view });
        actions.timers.push(TimerOp::Schedule {
            view,
            deadline: now + self.pacemaker.current_timeout_ms(),
        });

        if notify_leader {
            actions.outbound.push((
                Destination::One(self.schedule.leader_of(view)),
                Message::NewView(NewView {
                    view,
                    highest_qc: self.highest_qc.clone(),
                }),
            ));
        }
    }

    /// View advance with the corresponding trace event.
    fn advance_to(&mut self, now: u64, view: ViewNumber, notify_leader: bool, actions: &mut Actions) {
        if view <= self.current_view {
            return;
        }
        actions.trace.push(TraceEvent::new(
            now,
            TraceKind::ViewChange {
                replica_id: self.id,
                new_view: view,
            },
        ));
        self.enter_view(now, view, notify_leader, actions);
    }

    fn observe_qc(&mut self, qc: QuorumCert) {
        self.qc_by_block
            .entry(qc.block_hash)
            .and_modify(|existing| {
                if qc.view > existing.view {
                    *existing = qc.clone();
                }
            })
            .or_insert_with(|| qc.clone());
        // Only prepare QCs can justify future proposals, so only they move
        // the high-water mark carried in NewView messages.
        if qc.phase == Phase::Prepare && qc.view > self.highest_qc.view {
            self.highest_qc = qc;
        }
    }

    fn set_prepare_qc(&mut self, qc: QuorumCert) {
        match &self.prepare_qc {
            Some(existing) if existing.view >= qc.view => {}
            _ => self.prepare_qc = Some(qc),
        }
    }

    /// Applies fault behavior to a handler's output.
    fn finalize(&mut self, now: u64, mut actions: Actions) -> Actions {
        match self.fault {
            FaultType::Silent => {
                actions.outbound.clear();
            }
            FaultType::RandomDrop => {
                let mut kept = Vec::with_capacity(actions.outbound.len());
                for entry in actions.outbound.drain(..) {
                    if self
                        .fault_rng
                        .next_bool_with_probability(self.fault_drop_probability)
                    {
                        actions.trace.push(TraceEvent::new(
                            now,
                            TraceKind::ByzantineAction {
                                replica_id: self.id,
                                action: "drop_message".to_string(),
                            },
                        ));
                    } else {
                        kept.push(entry);
                    }
                }
                actions.outbound = kept;
            }
            _ => {}
        }
        actions
    }
}
