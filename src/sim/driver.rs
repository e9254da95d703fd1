use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{FaultType, SimConfig};
use crate::consensus::replica::{Actions, Destination, Replica, ReplicaSnapshot, TimerOp};
use crate::error::SimError;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::network::SimNetwork;
use crate::sim::event::{EventKind, EventQueue};
use crate::sim::rng::SimRng;
use crate::trace::{EventLog, TraceEvent, TraceKind};
use crate::types::{ReplicaId, ViewNumber};

/// Run-level status exposed to the server and CLI layers.
#[derive(Clone, Serialize, Debug)]
pub struct StatusSnapshot {
    pub is_running: bool,
    pub is_paused: bool,
    pub current_time: u64,
    pub current_view: ViewNumber,
}

/// Composes replicas, network, clock and event queue, and steps the
/// simulation one event at a time.
///
/// Single-threaded by design: the only suspension point is between
/// consecutive queue pops, so every run is reproducible from
/// (config, seed).
#[derive(Debug)]
pub struct SimulationDriver {
    config: SimConfig,
    warnings: Vec<String>,
    clock: u64,
    queue: EventQueue,
    network: SimNetwork,
    replicas: Vec<Replica>,
    log: EventLog,
    metrics: MetricsCollector,
    running: bool,
    paused: bool,
    steps_taken: u64,
}

impl SimulationDriver {
    /// Builds and bootstraps a simulation. Configuration errors surface
    /// here, never from inside the step loop.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        let warnings = config.validate()?;
        for warning in &warnings {
            warn!("{}", warning);
        }

        // One master stream; forks are drawn in a fixed order so the
        // network and every replica get independent deterministic streams.
        let mut master_rng = SimRng::new(config.seed);
        let network_rng = master_rng.fork();

        let replicas = (0..config.num_replicas as ReplicaId)
            .map(|id| {
                let fault = if (id as usize) < config.num_faulty {
                    config.fault_type
                } else {
                    FaultType::None
                };
                Replica::new(id, &config, fault, master_rng.fork())
            })
            .collect();

        let mut driver = Self {
            network: SimNetwork::new(&config, network_rng),
            config,
            warnings,
            clock: 0,
            queue: EventQueue::new(),
            replicas,
            log: EventLog::new(),
            metrics: MetricsCollector::new(),
            running: true,
            paused: false,
            steps_taken: 0,
        };

        for id in 0..driver.replicas.len() {
            let actions = driver.replicas[id].start(0);
            driver.apply_actions(id as ReplicaId, actions);
        }
        Ok(driver)
    }

    /// Rebuilds all state from the given configuration and seed.
    pub fn reset(&mut self, config: SimConfig) -> Result<(), SimError> {
        *self = Self::new(config)?;
        Ok(())
    }

    pub fn start(&mut self) {
        self.paused = false;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn config_warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    pub fn trace(&self) -> &[TraceEvent] {
        self.log.events()
    }

    pub fn trace_json(&self) -> Result<String, SimError> {
        self.log.to_json()
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            is_running: self.running,
            is_paused: self.paused,
            current_time: self.clock,
            current_view: self.max_honest_view(),
        }
    }

    pub fn replicas(&self) -> Vec<ReplicaSnapshot> {
        self.replicas.iter().map(Replica::snapshot).collect()
    }

    pub fn replica(&self, id: ReplicaId) -> Option<&Replica> {
        self.replicas.get(id as usize)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.clock)
    }

    /// Pops and dispatches one event. Returns the trace events it emitted,
    /// or `None` once the simulation has terminated. Only a protocol
    /// violation — an implementation bug, not a tolerated fault — raises.
    pub fn step(&mut self) -> Result<Option<Vec<TraceEvent>>, SimError> {
        if !self.running {
            return Ok(None);
        }
        let Some(event) = self.queue.pop() else {
            debug!("event queue exhausted");
            self.running = false;
            return Ok(None);
        };

        // Time never moves backward.
        self.clock = self.clock.max(event.time);
        let mark = self.log.len();

        match event.kind {
            EventKind::Deliver(envelope) => {
                let recipient = envelope.recipient;
                if self.replicas[recipient as usize].is_crashed() {
                    // Crashed replicas discard incoming messages.
                } else {
                    self.record(TraceEvent::new(
                        self.clock,
                        TraceKind::MessageReceive {
                            sender_id: envelope.sender,
                            recipient_id: recipient,
                            message_type: envelope.message.kind().to_string(),
                            view: envelope.message.view(),
                        },
                    ));
                    let actions = match self.replicas[recipient as usize].on_message(
                        self.clock,
                        envelope.sender,
                        envelope.message,
                    ) {
                        Ok(actions) => actions,
                        Err(error) => {
                            self.running = false;
                            return Err(error);
                        }
                    };
                    self.apply_actions(recipient, actions);
                }
            }
            EventKind::Timer { replica, view } => {
                let actions = self.replicas[replica as usize].on_timer(self.clock, view);
                self.apply_actions(replica, actions);
            }
        }

        self.steps_taken += 1;
        self.check_terminal();
        Ok(Some(self.log.since(mark).to_vec()))
    }

    /// Steps until `max_steps` are consumed, the queue drains, or a
    /// terminal condition is reached. Returns the trace slice this call
    /// produced.
    pub fn run(&mut self, max_steps: u64) -> Result<Vec<TraceEvent>, SimError> {
        let mark = self.log.len();
        let mut consumed = 0;
        while consumed < max_steps && self.running && !self.paused {
            if self.step()?.is_none() {
                break;
            }
            consumed += 1;
        }
        Ok(self.log.since(mark).to_vec())
    }

    /// Routes a handler's output: trace to the log, timer ops to the
    /// queue, messages to the network.
    fn apply_actions(&mut self, id: ReplicaId, actions: Actions) {
        for event in actions.trace {
            self.record(event);
        }
        for op in actions.timers {
            match op {
                TimerOp::CancelBefore { view } => self.queue.cancel(|event| {
                    matches!(
                        event.kind,
                        EventKind::Timer { replica, view: v } if replica == id && v < view
                    )
                }),
                TimerOp::Schedule { view, deadline } => {
                    self.queue
                        .push(deadline, EventKind::Timer { replica: id, view });
                }
            }
        }
        for (destination, message) in actions.outbound {
            let trace = match destination {
                Destination::One(recipient) => {
                    self.network
                        .send(&mut self.queue, self.clock, id, recipient, message)
                }
                Destination::All => self
                    .network
                    .broadcast(&mut self.queue, self.clock, id, message),
            };
            for event in trace {
                self.record(event);
            }
        }
    }

    fn record(&mut self, event: TraceEvent) {
        self.metrics.observe(&event);
        self.log.append(event);
    }

    fn max_honest_view(&self) -> ViewNumber {
        self.replicas
            .iter()
            .filter(|r| !r.is_faulty())
            .map(Replica::current_view)
            .max()
            .unwrap_or(0)
    }

    fn min_honest_view(&self) -> ViewNumber {
        self.replicas
            .iter()
            .filter(|r| !r.is_faulty())
            .map(Replica::current_view)
            .min()
            .unwrap_or(0)
    }

    fn check_terminal(&mut self) {
        if self.queue.is_empty() {
            self.running = false;
            return;
        }
        // The run ends only once every honest replica has moved past the
        // view horizon, so in-flight decides still land.
        if let Some(max_views) = self.config.max_views {
            if self.min_honest_view() > max_views {
                debug!(max_views, "terminal: view horizon reached");
                self.running = false;
            }
        }
    }
}
