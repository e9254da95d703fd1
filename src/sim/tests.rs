//! End-to-end simulation scenarios: happy paths, fault injection, boundary
//! configurations and the safety properties every run must uphold.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::config::{FaultType, PacemakerType, SimConfig};
use crate::sim::driver::SimulationDriver;
use crate::trace::{TraceEvent, TraceKind};
use crate::types::{Block, BlockHash, ReplicaId};

const STEP_BUDGET: u64 = 200_000;

fn base_config() -> SimConfig {
    SimConfig {
        num_replicas: 4,
        base_timeout_ms: 100,
        network_latency_ms: 5,
        network_jitter_ms: 0,
        drop_probability: 0.0,
        seed: 42,
        ..Default::default()
    }
}

fn run_to_completion(config: SimConfig) -> SimulationDriver {
    let mut driver = SimulationDriver::new(config).unwrap();
    driver.run(STEP_BUDGET).unwrap();
    driver
}

fn count_events(trace: &[TraceEvent], type_name: &str) -> usize {
    trace.iter().filter(|e| e.type_name() == type_name).count()
}

fn committed_heights(trace: &[TraceEvent]) -> BTreeSet<u64> {
    trace
        .iter()
        .filter_map(|e| match e.kind {
            TraceKind::Commit { height, .. } => Some(height),
            _ => None,
        })
        .collect()
}

/// Agreement, chain integrity and validity over every honest replica's
/// committed chain.
fn assert_safety_properties(driver: &SimulationDriver) {
    let num_replicas = driver.config().num_replicas as u64;
    let mut by_height: HashMap<u64, BlockHash> = HashMap::new();

    for snapshot in driver.replicas() {
        if snapshot.is_faulty {
            continue;
        }
        let replica = driver.replica(snapshot.replica_id).unwrap();
        let mut prev = Block::genesis().hash;
        for hash in replica.committed_chain() {
            let block = replica
                .block(hash)
                .expect("committed block must be in the store");
            assert_eq!(
                block.parent_hash, prev,
                "replica {} committed a non-extending block at height {}",
                snapshot.replica_id, block.height
            );
            prev = *hash;

            assert_eq!(
                block.proposer,
                block.view % num_replicas,
                "committed block not proposed by its view leader"
            );

            match by_height.insert(block.height, *hash) {
                Some(existing) => assert_eq!(
                    existing, *hash,
                    "agreement violated at height {}",
                    block.height
                ),
                None => {}
            }
        }
    }
}

fn assert_no_double_votes(trace: &[TraceEvent]) {
    let mut seen: HashSet<(ReplicaId, u64, String)> = HashSet::new();
    for event in trace {
        if let TraceKind::VoteSend {
            replica_id,
            view,
            vote_type,
            ..
        } = &event.kind
        {
            assert!(
                seen.insert((*replica_id, *view, vote_type.clone())),
                "replica {} voted twice in (view {}, {})",
                replica_id,
                view,
                vote_type
            );
        }
    }
}

fn assert_locks_monotonic(trace: &[TraceEvent]) {
    let mut last: HashMap<ReplicaId, u64> = HashMap::new();
    for event in trace {
        if let TraceKind::LockUpdate {
            replica_id,
            locked_view,
            ..
        } = event.kind
        {
            let prev = last.entry(replica_id).or_insert(0);
            assert!(
                locked_view >= *prev,
                "replica {} lock regressed from {} to {}",
                replica_id,
                prev,
                locked_view
            );
            *prev = locked_view;
        }
    }
}

#[test]
fn test_happy_path_commits_three_blocks() {
    let driver = run_to_completion(SimConfig {
        max_views: Some(3),
        ..base_config()
    });
    let trace = driver.trace();

    let metrics = driver.metrics();
    assert_eq!(metrics.total_blocks_committed, 3);
    assert_eq!(metrics.total_timeouts, 0);
    assert_eq!(committed_heights(trace), BTreeSet::from([1, 2, 3]));
    assert_eq!(count_events(trace, "TIMEOUT"), 0);

    // One proposal and three QCs (prepare, pre-commit, commit) per block.
    let mut proposals: HashMap<BlockHash, usize> = HashMap::new();
    let mut qcs: HashMap<BlockHash, usize> = HashMap::new();
    for event in trace {
        match &event.kind {
            TraceKind::Proposal { block_hash, .. } => *proposals.entry(*block_hash).or_insert(0) += 1,
            TraceKind::QcFormation { block_hash, .. } => *qcs.entry(*block_hash).or_insert(0) += 1,
            _ => {}
        }
    }
    let committed: Vec<BlockHash> = trace
        .iter()
        .filter_map(|e| match e.kind {
            TraceKind::Commit { block_hash, .. } => Some(block_hash),
            _ => None,
        })
        .collect();
    for hash in committed {
        assert_eq!(proposals.get(&hash), Some(&1));
        assert_eq!(qcs.get(&hash), Some(&3));
    }

    assert_safety_properties(&driver);
    assert_no_double_votes(trace);
    assert_locks_monotonic(trace);
}

#[test]
fn test_crashed_leader_triggers_view_change_and_recovery() {
    let driver = run_to_completion(SimConfig {
        num_faulty: 1,
        fault_type: FaultType::Crash,
        max_views: Some(6),
        ..base_config()
    });
    let trace = driver.trace();

    // Views 1-3 are led by honest replicas; view 4 belongs to the crashed
    // replica 0 and must time out.
    assert!(trace.iter().any(|e| matches!(
        e.kind,
        TraceKind::Timeout { view: 4, .. }
    )));
    assert!(trace.iter().any(|e| matches!(
        e.kind,
        TraceKind::ViewChange { new_view: 5, .. }
    )));

    // Progress resumes under the next honest leader.
    let heights = committed_heights(trace);
    assert!(heights.contains(&4), "no commit after the view change");
    assert!(heights.is_superset(&BTreeSet::from([1, 2, 3, 4])));

    assert_safety_properties(&driver);
    assert_no_double_votes(trace);
    assert_locks_monotonic(trace);
}

#[test]
fn test_adaptive_pacemaker_with_lossy_replica() {
    let driver = run_to_completion(SimConfig {
        num_replicas: 7,
        num_faulty: 1,
        fault_type: FaultType::RandomDrop,
        fault_drop_probability: 0.3,
        pacemaker_type: PacemakerType::Adaptive,
        base_timeout_ms: 100,
        network_latency_ms: 10,
        min_timeout_ms: 50,
        seed: 7,
        max_views: Some(20),
        ..SimConfig::default()
    });
    let trace = driver.trace();

    let metrics = driver.metrics();
    assert!(
        metrics.total_blocks_committed >= 14,
        "only {} commits in 20 views",
        metrics.total_blocks_committed
    );
    assert!(metrics.average_commit_latency_ms > 0.0);

    assert_safety_properties(&driver);
    assert_no_double_votes(trace);
    assert_locks_monotonic(trace);
}

#[test]
fn test_too_many_crashes_stall_without_crashing() {
    let config = SimConfig {
        num_faulty: 2,
        fault_type: FaultType::Crash,
        seed: 1,
        max_views: Some(10),
        ..base_config()
    };
    let driver = run_to_completion(config);
    let trace = driver.trace();

    // Quorum is unreachable with two of four replicas down.
    assert!(committed_heights(trace).is_empty());
    assert_eq!(driver.metrics().total_blocks_committed, 0);
    // The configuration warned about the broken fault bound but still ran.
    assert!(!driver.config_warnings().is_empty());
    // View numbers grow linearly with timeouts.
    assert!(driver.status().current_view > 10);
    assert!(driver.metrics().total_timeouts >= 10);
}

#[test]
fn test_chained_mode_commits_trail_by_two_views() {
    let driver = run_to_completion(SimConfig {
        chained: true,
        base_timeout_ms: 1000,
        max_views: Some(6),
        ..base_config()
    });
    let trace = driver.trace();

    // Six proposals, commits starting once the first three-block chain
    // completes at view 3, reaching height 4 by the view horizon.
    assert_eq!(committed_heights(trace), BTreeSet::from([1, 2, 3, 4]));

    let first_view3_proposal = trace
        .iter()
        .find(|e| matches!(e.kind, TraceKind::Proposal { view: 3, .. }))
        .map(|e| e.timestamp)
        .expect("view 3 proposal missing");
    let first_commit = trace
        .iter()
        .find(|e| matches!(e.kind, TraceKind::Commit { .. }))
        .expect("no commit in chained run");
    assert!(first_commit.timestamp >= first_view3_proposal);
    assert!(matches!(first_commit.kind, TraceKind::Commit { height: 1, .. }));

    // Every honest replica commits the identical chain.
    let chains: BTreeSet<Vec<BlockHash>> = driver
        .replicas()
        .iter()
        .map(|s| driver.replica(s.replica_id).unwrap().committed_chain().to_vec())
        .collect();
    assert_eq!(chains.len(), 1);

    assert_safety_properties(&driver);
    assert_no_double_votes(trace);
}

#[test]
fn test_deterministic_replay_produces_identical_traces() {
    let config = SimConfig {
        num_faulty: 1,
        fault_type: FaultType::RandomDrop,
        network_jitter_ms: 7,
        drop_probability: 0.1,
        max_views: Some(8),
        ..base_config()
    };

    let a = run_to_completion(config.clone());
    let b = run_to_completion(config);

    let json_a = serde_json::to_string(a.trace()).unwrap();
    let json_b = serde_json::to_string(b.trace()).unwrap();
    assert_eq!(json_a, json_b);
}

#[test]
fn test_reset_reproduces_the_same_trace() {
    let config = SimConfig {
        max_views: Some(3),
        ..base_config()
    };
    let mut driver = SimulationDriver::new(config.clone()).unwrap();
    driver.run(STEP_BUDGET).unwrap();
    let first = serde_json::to_string(driver.trace()).unwrap();

    driver.reset(config).unwrap();
    driver.run(STEP_BUDGET).unwrap();
    let second = serde_json::to_string(driver.trace()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_full_partition_halts_commits_and_timeout_plateaus() {
    let config = SimConfig {
        pacemaker_type: PacemakerType::Adaptive,
        min_timeout_ms: 50,
        max_timeout_ms: 400,
        max_views: Some(12),
        ..base_config()
    }
    .partition_all();
    let driver = run_to_completion(config);
    let trace = driver.trace();

    assert!(committed_heights(trace).is_empty());

    // Replica 0's timeout intervals back off until they plateau at the cap.
    let timeouts: Vec<u64> = trace
        .iter()
        .filter_map(|e| match e.kind {
            TraceKind::Timeout { replica_id: 0, .. } => Some(e.timestamp),
            _ => None,
        })
        .collect();
    assert!(timeouts.len() >= 8);
    let gaps: Vec<u64> = timeouts.windows(2).map(|w| w[1] - w[0]).collect();
    for pair in gaps.windows(2) {
        assert!(pair[1] >= pair[0], "timeout interval shrank while starved");
    }
    let last = *gaps.last().unwrap();
    assert_eq!(last, 400, "timeout did not plateau at the cap");

    // View numbers only ever increase.
    let mut last_view: HashMap<ReplicaId, u64> = HashMap::new();
    for event in trace {
        if let TraceKind::ViewChange {
            replica_id,
            new_view,
        } = event.kind
        {
            let prev = last_view.entry(replica_id).or_insert(0);
            assert!(new_view > *prev);
            *prev = new_view;
        }
    }
}

#[test]
fn test_single_replica_commits_instantly() {
    let driver = run_to_completion(SimConfig {
        num_replicas: 1,
        max_views: Some(5),
        ..base_config()
    });
    let trace = driver.trace();

    assert_eq!(committed_heights(trace), BTreeSet::from([1, 2, 3, 4, 5]));
    assert_eq!(driver.metrics().total_timeouts, 0);
    // Self-delivery is instantaneous, so the whole run happens at t = 0.
    assert_eq!(driver.clock(), 0);
}

#[test]
fn test_equivocating_leader_cannot_split_honest_replicas() {
    let driver = run_to_completion(SimConfig {
        num_faulty: 1,
        fault_type: FaultType::ByzantineEquivocate,
        seed: 3,
        max_views: Some(6),
        ..base_config()
    });
    let trace = driver.trace();

    assert!(count_events(trace, "BYZANTINE_ACTION") > 0);
    // Neither conflicting block reaches quorum; progress resumes afterward.
    let heights = committed_heights(trace);
    assert!(heights.is_superset(&BTreeSet::from([1, 2, 3, 4])));

    assert_safety_properties(&driver);
    assert_no_double_votes(trace);
    assert_locks_monotonic(trace);
}

#[test]
fn test_status_and_snapshots_reflect_the_run() {
    let driver = run_to_completion(SimConfig {
        max_views: Some(3),
        ..base_config()
    });

    let status = driver.status();
    assert!(!status.is_running);
    assert!(status.current_view > 3);

    let snapshots = driver.replicas();
    assert_eq!(snapshots.len(), 4);
    for snapshot in &snapshots {
        assert!(!snapshot.is_faulty);
        assert_eq!(snapshot.committed_count, 3);
        assert!(snapshot.locked_qc.is_some());
    }
}

#[test]
fn test_step_returns_none_when_terminal() {
    let mut driver = SimulationDriver::new(SimConfig {
        max_views: Some(2),
        ..base_config()
    })
    .unwrap();
    driver.run(STEP_BUDGET).unwrap();
    assert!(!driver.is_running());
    assert!(driver.step().unwrap().is_none());
}

#[test]
fn test_run_respects_pause() {
    let mut driver = SimulationDriver::new(base_config()).unwrap();
    driver.pause();
    let events = driver.run(100).unwrap();
    assert!(events.is_empty());

    driver.start();
    let events = driver.run(10).unwrap();
    assert!(!events.is_empty());
}
