use std::collections::BTreeSet;

use crate::config::SimConfig;
use crate::message::{Envelope, Message};
use crate::sim::event::{EventKind, EventQueue};
use crate::sim::rng::SimRng;
use crate::trace::{TraceEvent, TraceKind};
use crate::types::ReplicaId;

/// The simulated asynchronous network.
///
/// Every send schedules at most one delivery event. Per-recipient latency is
/// `base + jitter` with jitter sampled from the seeded stream; drops and
/// partitions erase the delivery but still leave a trace. Self-delivery is
/// immediate and never dropped.
///
/// Same-edge messages are NOT FIFO: two sends to the same recipient draw
/// independent jitter samples and may overtake each other. Replicas have to
/// tolerate that.
#[derive(Debug)]
pub struct SimNetwork {
    num_replicas: usize,
    base_latency_ms: u64,
    jitter_ms: u64,
    drop_probability: f64,
    partitions: BTreeSet<(ReplicaId, ReplicaId)>,
    rng: SimRng,
}

impl SimNetwork {
    pub fn new(config: &SimConfig, rng: SimRng) -> Self {
        Self {
            num_replicas: config.num_replicas,
            base_latency_ms: config.network_latency_ms,
            jitter_ms: config.network_jitter_ms,
            drop_probability: config.drop_probability,
            partitions: config.partitions.iter().copied().collect(),
            rng,
        }
    }

    pub fn is_partitioned(&self, sender: ReplicaId, recipient: ReplicaId) -> bool {
        self.partitions.contains(&(sender, recipient))
    }

    /// Schedules delivery of `message` to one recipient. Returns the trace
    /// events describing what happened to it.
    ///
    /// The PRNG stream is advanced in a fixed order (one jitter sample, one
    /// drop sample, per non-self recipient), which is what keeps equal-seed
    /// runs bit-identical.
    pub fn send(
        &mut self,
        queue: &mut EventQueue,
        now: u64,
        sender: ReplicaId,
        recipient: ReplicaId,
        message: Message,
    ) -> Vec<TraceEvent> {
        let mut trace = vec![TraceEvent::new(
            now,
            TraceKind::MessageSend {
                sender_id: sender,
                recipient_id: recipient,
                message_type: message.kind().to_string(),
                view: message.view(),
            },
        )];

        // Partition check consumes no samples.
        if self.is_partitioned(sender, recipient) {
            trace.push(TraceEvent::new(
                now,
                TraceKind::MessageDrop {
                    sender_id: sender,
                    recipient_id: recipient,
                    message_type: message.kind().to_string(),
                    reason: Some("partitioned".to_string()),
                },
            ));
            return trace;
        }

        // Self-delivery is immediate, sample-free and never dropped.
        let deliver_time = if sender == recipient {
            now
        } else {
            let jitter = if self.jitter_ms > 0 {
                self.rng.next_u64_inclusive(self.jitter_ms)
            } else {
                0
            };
            let dropped = self.drop_probability > 0.0
                && self.rng.next_bool_with_probability(self.drop_probability);
            if dropped {
                trace.push(TraceEvent::new(
                    now,
                    TraceKind::MessageDrop {
                        sender_id: sender,
                        recipient_id: recipient,
                        message_type: message.kind().to_string(),
                        reason: None,
                    },
                ));
                return trace;
            }
            now + self.base_latency_ms + jitter
        };

        queue.push(
            deliver_time,
            EventKind::Deliver(Envelope {
                send_time: now,
                deliver_time,
                sender,
                recipient,
                message,
            }),
        );
        trace
    }

    /// Expands a broadcast into N point-to-point sends with independent
    /// latency samples, in ascending recipient order.
    pub fn broadcast(
        &mut self,
        queue: &mut EventQueue,
        now: u64,
        sender: ReplicaId,
        message: Message,
    ) -> Vec<TraceEvent> {
        let mut trace = Vec::new();
        for recipient in 0..self.num_replicas as ReplicaId {
            trace.extend(self.send(queue, now, sender, recipient, message.clone()));
        }
        trace
    }
}
