use crate::config::SimConfig;
use crate::types::{ReplicaId, ViewNumber};

/// Round-robin view-to-leader mapping, shared by all replicas.
#[derive(Clone, Copy, Debug)]
pub struct LeaderSchedule {
    num_replicas: usize,
}

impl LeaderSchedule {
    pub fn new(num_replicas: usize) -> Self {
        Self { num_replicas }
    }

    pub fn leader_of(&self, view: ViewNumber) -> ReplicaId {
        view % self.num_replicas as u64
    }
}

/// The liveness sub-protocol: decides how long to wait in a view before
/// giving up, and which view to move to on expiry.
///
/// One instance per replica; the driver schedules the actual timer events
/// from `current_timeout_ms` on every view entry.
pub trait Pacemaker: std::fmt::Debug + Send {
    /// The replica entered `view`; reset per-view bookkeeping.
    fn on_enter_view(&mut self, view: ViewNumber);

    /// A block committed with the given locally observed latency.
    fn on_commit(&mut self, latency_ms: u64);

    /// The timer for the current view expired. Returns the view to move to.
    fn on_timeout(&mut self) -> ViewNumber;

    /// Timer duration for the current view.
    fn current_timeout_ms(&self) -> u64;
}

/// Fixed-timeout pacemaker: always waits `Δ`, ignores observed latency.
#[derive(Clone, Debug)]
pub struct BaselinePacemaker {
    view: ViewNumber,
    timeout_ms: u64,
}

impl BaselinePacemaker {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            view: 0,
            timeout_ms,
        }
    }
}

impl Pacemaker for BaselinePacemaker {
    fn on_enter_view(&mut self, view: ViewNumber) {
        self.view = view;
    }

    fn on_commit(&mut self, _latency_ms: u64) {}

    fn on_timeout(&mut self) -> ViewNumber {
        self.view + 1
    }

    fn current_timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

/// EMA-tuned pacemaker.
///
/// Tracks an exponentially weighted moving average of locally observed
/// commit latencies and waits `max(Δ_min, k · ema)`. Consecutive timeouts
/// multiply the wait by a back-off factor, capped at `Δ_max`; a commit
/// resets the back-off.
#[derive(Clone, Debug)]
pub struct AdaptivePacemaker {
    view: ViewNumber,
    ema_latency_ms: f64,
    alpha: f64,
    multiplier_k: f64,
    min_timeout_ms: u64,
    max_timeout_ms: u64,
    backoff_factor: f64,
    consecutive_timeouts: u32,
}

impl AdaptivePacemaker {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            view: 0,
            ema_latency_ms: 0.0,
            alpha: config.ema_alpha,
            multiplier_k: config.timeout_multiplier_k,
            min_timeout_ms: config.min_timeout_ms,
            max_timeout_ms: config.max_timeout_ms,
            backoff_factor: config.backoff_factor,
            consecutive_timeouts: 0,
        }
    }

    pub fn ema_latency_ms(&self) -> f64 {
        self.ema_latency_ms
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }
}

impl Pacemaker for AdaptivePacemaker {
    fn on_enter_view(&mut self, view: ViewNumber) {
        self.view = view;
    }

    fn on_commit(&mut self, latency_ms: u64) {
        let sample = latency_ms as f64;
        if self.ema_latency_ms == 0.0 {
            self.ema_latency_ms = sample;
        } else {
            self.ema_latency_ms = self.alpha * sample + (1.0 - self.alpha) * self.ema_latency_ms;
        }
        self.consecutive_timeouts = 0;
    }

    fn on_timeout(&mut self) -> ViewNumber {
        self.consecutive_timeouts = self.consecutive_timeouts.saturating_add(1);
        self.view + 1
    }

    fn current_timeout_ms(&self) -> u64 {
        let base = (self.multiplier_k * self.ema_latency_ms).max(self.min_timeout_ms as f64);
        let backed_off = base * self.backoff_factor.powi(self.consecutive_timeouts as i32);
        (backed_off as u64).min(self.max_timeout_ms)
    }
}

/// Builds the configured pacemaker variant.
pub fn build_pacemaker(config: &SimConfig) -> Box<dyn Pacemaker> {
    match config.pacemaker_type {
        crate::config::PacemakerType::Baseline => {
            Box::new(BaselinePacemaker::new(config.base_timeout_ms))
        }
        crate::config::PacemakerType::Adaptive => Box::new(AdaptivePacemaker::new(config)),
    }
}
