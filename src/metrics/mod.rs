use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::trace::{TraceEvent, TraceKind};

/// Summary metrics for one simulation run, computed over the trace.
#[derive(Clone, PartialEq, Serialize, Deserialize, Debug, Default)]
pub struct MetricsSnapshot {
    pub total_blocks_committed: u64,
    pub total_timeouts: u64,
    pub average_commit_latency_ms: f64,
    pub throughput_blocks_per_second: f64,
    pub view_change_count: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
}

/// Folds trace events into counters as the driver records them.
///
/// Committed blocks are counted once per height (the first replica to
/// commit it); latency percentiles pool every replica's locally observed
/// commit latencies.
#[derive(Clone, Debug, Default)]
pub struct MetricsCollector {
    committed_heights: BTreeSet<u64>,
    timeouts: u64,
    view_changes: u64,
    latencies_ms: Vec<u64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &TraceEvent) {
        match &event.kind {
            TraceKind::Commit {
                height, latency_ms, ..
            } => {
                self.committed_heights.insert(*height);
                self.latencies_ms.push(*latency_ms);
            }
            TraceKind::Timeout { .. } => self.timeouts += 1,
            TraceKind::ViewChange { .. } => self.view_changes += 1,
            _ => {}
        }
    }

    pub fn snapshot(&self, now_ms: u64) -> MetricsSnapshot {
        let committed = self.committed_heights.len() as u64;

        let average = if self.latencies_ms.is_empty() {
            0.0
        } else {
            self.latencies_ms.iter().sum::<u64>() as f64 / self.latencies_ms.len() as f64
        };

        let throughput = if committed > 0 && now_ms > 0 {
            committed as f64 / (now_ms as f64 / 1000.0)
        } else {
            0.0
        };

        let mut sorted = self.latencies_ms.clone();
        sorted.sort_unstable();

        MetricsSnapshot {
            total_blocks_committed: committed,
            total_timeouts: self.timeouts,
            average_commit_latency_ms: average,
            throughput_blocks_per_second: throughput,
            view_change_count: self.view_changes,
            p50_latency_ms: percentile(&sorted, 50.0),
            p95_latency_ms: percentile(&sorted, 95.0),
            p99_latency_ms: percentile(&sorted, 99.0),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Nearest-rank percentile over an already sorted slice.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockHash;

    fn commit(timestamp: u64, replica: u64, height: u64, latency_ms: u64) -> TraceEvent {
        TraceEvent::new(
            timestamp,
            TraceKind::Commit {
                replica_id: replica,
                height,
                block_hash: BlockHash::from_bytes(&height.to_be_bytes()),
                latency_ms,
            },
        )
    }

    #[test]
    fn test_heights_counted_once() {
        let mut metrics = MetricsCollector::new();
        metrics.observe(&commit(100, 0, 1, 40));
        metrics.observe(&commit(110, 1, 1, 50));
        metrics.observe(&commit(200, 0, 2, 60));

        let snap = metrics.snapshot(1000);
        assert_eq!(snap.total_blocks_committed, 2);
        // Every replica's latency sample still counts.
        assert!((snap.average_commit_latency_ms - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_timeouts_and_view_changes() {
        let mut metrics = MetricsCollector::new();
        metrics.observe(&TraceEvent::new(
            10,
            TraceKind::Timeout {
                replica_id: 0,
                view: 1,
            },
        ));
        metrics.observe(&TraceEvent::new(
            10,
            TraceKind::ViewChange {
                replica_id: 0,
                new_view: 2,
            },
        ));

        let snap = metrics.snapshot(100);
        assert_eq!(snap.total_timeouts, 1);
        assert_eq!(snap.view_change_count, 1);
    }

    #[test]
    fn test_throughput_over_elapsed_time() {
        let mut metrics = MetricsCollector::new();
        for h in 1..=5 {
            metrics.observe(&commit(h * 100, 0, h, 30));
        }
        let snap = metrics.snapshot(1000);
        assert!((snap.throughput_blocks_per_second - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentiles() {
        let sorted: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&sorted, 50.0), 51);
        assert_eq!(percentile(&sorted, 95.0), 95);
        assert_eq!(percentile(&sorted, 99.0), 99);
        assert_eq!(percentile(&[], 50.0), 0);
    }
}
