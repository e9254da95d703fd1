use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::types::ReplicaId;

/// Misbehavior assigned to the faulty replicas.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultType {
    #[default]
    None,
    Crash,
    Silent,
    RandomDrop,
    ByzantineEquivocate,
}

impl FromStr for FaultType {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(FaultType::None),
            "CRASH" => Ok(FaultType::Crash),
            "SILENT" => Ok(FaultType::Silent),
            "RANDOM_DROP" => Ok(FaultType::RandomDrop),
            "BYZANTINE_EQUIVOCATE" => Ok(FaultType::ByzantineEquivocate),
            other => Err(SimError::Configuration(format!(
                "unknown fault type: {}",
                other
            ))),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum PacemakerType {
    #[default]
    Baseline,
    Adaptive,
}

impl FromStr for PacemakerType {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "baseline" => Ok(PacemakerType::Baseline),
            "adaptive" => Ok(PacemakerType::Adaptive),
            other => Err(SimError::Configuration(format!(
                "unknown pacemaker type: {}",
                other
            ))),
        }
    }
}

/// Complete configuration for a simulation run. A (config, seed) pair fully
/// determines the trace.
#[derive(Clone, PartialEq, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct SimConfig {
    pub num_replicas: usize,
    pub num_faulty: usize,
    pub fault_type: FaultType,
    pub pacemaker_type: PacemakerType,

    // Timing parameters
    pub base_timeout_ms: u64,
    pub network_latency_ms: u64,
    pub network_jitter_ms: u64,
    pub drop_probability: f64,

    // Adaptive pacemaker tuning
    pub ema_alpha: f64,
    pub timeout_multiplier_k: f64,
    pub min_timeout_ms: u64,
    pub max_timeout_ms: u64,
    pub backoff_factor: f64,

    // Fault injection
    pub fault_drop_probability: f64,
    /// Directed pairs whose deliveries are dropped. `partition` adds both
    /// directions.
    pub partitions: Vec<(ReplicaId, ReplicaId)>,

    pub seed: u64,
    pub max_views: Option<u64>,
    pub chained: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_replicas: 4,
            num_faulty: 0,
            fault_type: FaultType::None,
            pacemaker_type: PacemakerType::Baseline,
            base_timeout_ms: 1000,
            network_latency_ms: 10,
            network_jitter_ms: 0,
            drop_probability: 0.0,
            ema_alpha: 0.3,
            timeout_multiplier_k: 3.0,
            min_timeout_ms: 50,
            max_timeout_ms: 10_000,
            backoff_factor: 1.5,
            fault_drop_probability: 0.5,
            partitions: Vec::new(),
            seed: 0,
            max_views: None,
            chained: false,
        }
    }
}

/// Derived quorum parameters, returned by the configuration API.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct QuorumParams {
    pub quorum_size: usize,
    pub max_faulty: usize,
}

impl SimConfig {
    /// Largest number of Byzantine replicas the protocol tolerates.
    pub fn max_faulty(&self) -> usize {
        (self.num_replicas.saturating_sub(1)) / 3
    }

    /// Votes required to form a QC: `N - f` with `f = ⌊(N-1)/3⌋`.
    pub fn quorum_size(&self) -> usize {
        self.num_replicas - self.max_faulty()
    }

    pub fn quorum_params(&self) -> QuorumParams {
        QuorumParams {
            quorum_size: self.quorum_size(),
            max_faulty: self.max_faulty(),
        }
    }

    /// Checks numeric ranges and enum coherence. Hard errors for invalid
    /// values; a warning list for configurations that run but void the
    /// safety guarantee (`num_faulty > (N-1)/3`).
    pub fn validate(&self) -> Result<Vec<String>, SimError> {
        if self.num_replicas == 0 {
            return Err(SimError::Configuration(
                "num_replicas must be at least 1".to_string(),
            ));
        }
        if self.base_timeout_ms == 0 {
            return Err(SimError::Configuration(
                "base_timeout_ms must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.drop_probability) {
            return Err(SimError::Configuration(format!(
                "drop_probability must be in [0, 1], got {}",
                self.drop_probability
            )));
        }
        if !(0.0..=1.0).contains(&self.fault_drop_probability) {
            return Err(SimError::Configuration(format!(
                "fault_drop_probability must be in [0, 1], got {}",
                self.fault_drop_probability
            )));
        }
        if !(0.0..=1.0).contains(&self.ema_alpha) {
            return Err(SimError::Configuration(format!(
                "ema_alpha must be in [0, 1], got {}",
                self.ema_alpha
            )));
        }
        if self.num_faulty > self.num_replicas {
            return Err(SimError::Configuration(format!(
                "num_faulty ({}) exceeds num_replicas ({})",
                self.num_faulty, self.num_replicas
            )));
        }
        if self.min_timeout_ms == 0 || self.max_timeout_ms < self.min_timeout_ms {
            return Err(SimError::Configuration(
                "timeout bounds must satisfy 0 < min_timeout_ms <= max_timeout_ms".to_string(),
            ));
        }
        if let Some((a, b)) = self
            .partitions
            .iter()
            .find(|(a, b)| *a >= self.num_replicas as u64 || *b >= self.num_replicas as u64)
        {
            return Err(SimError::Configuration(format!(
                "partition pair ({}, {}) references an unknown replica",
                a, b
            )));
        }

        let mut warnings = Vec::new();
        if self.num_faulty > self.max_faulty() {
            warnings.push(format!(
                "num_faulty ({}) exceeds the tolerated maximum {} for {} replicas; \
                 safety is no longer guaranteed",
                self.num_faulty,
                self.max_faulty(),
                self.num_replicas
            ));
        }
        if self.num_faulty > 0 && self.fault_type == FaultType::None {
            warnings.push("num_faulty > 0 but fault_type is NONE; no replica will misbehave".to_string());
        }
        Ok(warnings)
    }

    /// Adds a bidirectional partition between two replicas.
    pub fn partition(mut self, a: ReplicaId, b: ReplicaId) -> Self {
        self.partitions.push((a, b));
        self.partitions.push((b, a));
        self
    }

    /// Fully disconnects every replica from every other.
    pub fn partition_all(mut self) -> Self {
        let n = self.num_replicas as u64;
        let mut pairs = BTreeSet::new();
        for a in 0..n {
            for b in 0..n {
                if a != b {
                    pairs.insert((a, b));
                }
            }
        }
        self.partitions = pairs.into_iter().collect();
        self
    }

    /// Loads a config file; TOML or JSON chosen by extension, like the rest
    /// of the tooling expects.
    pub fn load_from_file(path: &Path) -> Result<Self, SimError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SimError::Configuration(format!("failed to read config file: {}", e)))?;

        if path.extension() == Some(std::ffi::OsStr::new("toml")) {
            toml::from_str(&content)
                .map_err(|e| SimError::Configuration(format!("failed to parse TOML config: {}", e)))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| SimError::Configuration(format!("failed to parse JSON config: {}", e)))
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SimError> {
        let content = if path.extension() == Some(std::ffi::OsStr::new("toml")) {
            toml::to_string_pretty(self)
                .map_err(|e| SimError::Configuration(format!("failed to serialize to TOML: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)
            .map_err(|e| SimError::Configuration(format!("failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Overlays `HOTSTUFF_`-prefixed environment variables onto `self`.
    pub fn overlay_env(mut self) -> Result<Self, SimError> {
        fn parse<T: FromStr>(name: &str, value: &str) -> Result<T, SimError>
        where
            T::Err: std::fmt::Display,
        {
            value.parse::<T>().map_err(|e| {
                SimError::Configuration(format!("invalid value for {}: {}", name, e))
            })
        }

        for (key, value) in std::env::vars() {
            let Some(option) = key.strip_prefix("HOTSTUFF_") else {
                continue;
            };
            match option {
                "NUM_REPLICAS" => self.num_replicas = parse(&key, &value)?,
                "NUM_FAULTY" => self.num_faulty = parse(&key, &value)?,
                "FAULT_TYPE" => self.fault_type = value.parse()?,
                "PACEMAKER_TYPE" => self.pacemaker_type = value.parse()?,
                "BASE_TIMEOUT_MS" => self.base_timeout_ms = parse(&key, &value)?,
                "NETWORK_LATENCY_MS" => self.network_latency_ms = parse(&key, &value)?,
                "NETWORK_JITTER_MS" => self.network_jitter_ms = parse(&key, &value)?,
                "DROP_PROBABILITY" => self.drop_probability = parse(&key, &value)?,
                "SEED" => self.seed = parse(&key, &value)?,
                "MAX_VIEWS" => self.max_views = Some(parse(&key, &value)?),
                "CHAINED" => self.chained = parse(&key, &value)?,
                _ => {}
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_arithmetic() {
        let mut config = SimConfig::default();
        config.num_replicas = 4;
        assert_eq!(config.max_faulty(), 1);
        assert_eq!(config.quorum_size(), 3);

        config.num_replicas = 7;
        assert_eq!(config.max_faulty(), 2);
        assert_eq!(config.quorum_size(), 5);

        config.num_replicas = 1;
        assert_eq!(config.max_faulty(), 0);
        assert_eq!(config.quorum_size(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut config = SimConfig::default();
        config.num_replicas = 0;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.drop_probability = 1.5;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.base_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_warns_on_excess_faults() {
        let mut config = SimConfig::default();
        config.num_replicas = 4;
        config.num_faulty = 2;
        config.fault_type = FaultType::Crash;
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("safety"));
    }

    #[test]
    fn test_fault_type_from_str() {
        assert_eq!(
            "RANDOM_DROP".parse::<FaultType>().unwrap(),
            FaultType::RandomDrop
        );
        assert_eq!("crash".parse::<FaultType>().unwrap(), FaultType::Crash);
        assert!("GRAY_FAILURE".parse::<FaultType>().is_err());
    }

    #[test]
    fn test_partition_all_is_symmetric() {
        let config = SimConfig {
            num_replicas: 3,
            ..Default::default()
        }
        .partition_all();
        assert_eq!(config.partitions.len(), 6);
        assert!(config.partitions.contains(&(0, 2)));
        assert!(config.partitions.contains(&(2, 0)));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SimConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: SimConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, back);
    }
}
