use std::path::PathBuf;

use clap::Parser;
use hotstuff_sim::config::{FaultType, PacemakerType, SimConfig};
use hotstuff_sim::sim::SimulationDriver;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Runs a HotStuff consensus simulation and prints summary metrics.
#[derive(Parser, Debug)]
#[command(name = "hotstuff-sim", version, about)]
struct Args {
    /// Configuration file (TOML or JSON); flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of replicas.
    #[arg(short = 'n', long)]
    replicas: Option<usize>,

    /// Number of faulty replicas (ids 0..num_faulty).
    #[arg(short = 'f', long)]
    faulty: Option<usize>,

    /// Fault type: NONE, CRASH, SILENT, RANDOM_DROP, BYZANTINE_EQUIVOCATE.
    #[arg(long)]
    fault_type: Option<FaultType>,

    /// Pacemaker variant: baseline or adaptive.
    #[arg(long)]
    pacemaker: Option<PacemakerType>,

    /// Base view timeout in milliseconds.
    #[arg(long)]
    base_timeout_ms: Option<u64>,

    /// Mean one-way network latency in milliseconds.
    #[arg(long)]
    latency_ms: Option<u64>,

    /// Uniform latency jitter bound in milliseconds.
    #[arg(long)]
    jitter_ms: Option<u64>,

    /// Per-edge message drop probability in [0, 1].
    #[arg(long)]
    drop_probability: Option<f64>,

    /// Seed for the deterministic PRNG.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Stop once every honest replica has passed this view.
    #[arg(long)]
    max_views: Option<u64>,

    /// Run chained (pipelined) HotStuff instead of the basic four-phase loop.
    #[arg(long)]
    chained: bool,

    /// Hard cap on dispatched events.
    #[arg(long, default_value_t = 1_000_000)]
    max_steps: u64,

    /// Write the full trace to this file as JSON.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<(SimConfig, u64, Option<PathBuf>), hotstuff_sim::SimError> {
        let mut config = match &self.config {
            Some(path) => SimConfig::load_from_file(path)?,
            None => SimConfig::default(),
        };
        config = config.overlay_env()?;

        if let Some(n) = self.replicas {
            config.num_replicas = n;
        }
        if let Some(f) = self.faulty {
            config.num_faulty = f;
        }
        if let Some(fault_type) = self.fault_type {
            config.fault_type = fault_type;
        }
        if let Some(pacemaker) = self.pacemaker {
            config.pacemaker_type = pacemaker;
        }
        if let Some(timeout) = self.base_timeout_ms {
            config.base_timeout_ms = timeout;
        }
        if let Some(latency) = self.latency_ms {
            config.network_latency_ms = latency;
        }
        if let Some(jitter) = self.jitter_ms {
            config.network_jitter_ms = jitter;
        }
        if let Some(p) = self.drop_probability {
            config.drop_probability = p;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(max_views) = self.max_views {
            config.max_views = Some(max_views);
        }
        if self.chained {
            config.chained = true;
        }

        Ok((config, self.max_steps, self.trace_out))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (config, max_steps, trace_out) = Args::parse().into_config()?;
    let mut driver = SimulationDriver::new(config)?;
    for warning in driver.config_warnings() {
        eprintln!("warning: {}", warning);
    }

    driver.run(max_steps)?;

    let summary = serde_json::json!({
        "status": driver.status(),
        "quorum": driver.config().quorum_params(),
        "metrics": driver.metrics(),
        "replicas": driver.replicas(),
        "steps": driver.steps_taken(),
        "trace_events": driver.trace().len(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(path) = trace_out {
        std::fs::write(&path, driver.trace_json()?)?;
        eprintln!("trace written to {}", path.display());
    }
    Ok(())
}
