pub mod config;
pub mod consensus;
pub mod error;
pub mod message;
pub mod metrics;
pub mod network;
pub mod sim;
pub mod trace;
pub mod types;

pub use config::{FaultType, PacemakerType, QuorumParams, SimConfig};
pub use error::SimError;
pub use metrics::MetricsSnapshot;
pub use sim::{SimulationDriver, StatusSnapshot};
pub use trace::{EventLog, TraceEvent, TraceKind};
pub use types::{Block, BlockHash, Phase, QuorumCert, ReplicaId, ViewNumber};
