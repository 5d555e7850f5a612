//! Run configuration.
//!
//! RULE: Configuration is supplied at construction and never mutated
//! mid-run. The engine keeps its own copy and writes it into every
//! checkpoint bundle so a checkpoint is self-describing.

use crate::{
    error::{SimError, SimResult},
    intercept::InterceptorKind,
    quantize::{Quantizer, DEFAULT_DIGITS},
    systems::SystemKind,
    types::{RunId, Tick},
    value::{Coefficient, Currency},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointPolicy {
    /// Write a checkpoint every `interval` committed ticks. 0 disables.
    #[serde(default)]
    pub interval: Tick,
    #[serde(default = "default_checkpoint_dir")]
    pub dir:      PathBuf,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self { interval: 0, dir: default_checkpoint_dir() }
    }
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_digits() -> u32 {
    DEFAULT_DIGITS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    pub run_id:           RunId,
    pub seed:             u64,
    #[serde(default = "default_digits")]
    pub precision_digits: u32,
    /// Maximum states kept for undo. `None` keeps everything.
    #[serde(default)]
    pub history_depth:    Option<usize>,
    #[serde(default)]
    pub checkpoint:       CheckpointPolicy,
    /// Systems in execution order.
    pub systems:          Vec<SystemKind>,
    /// Interceptors in chain order.
    #[serde(default)]
    pub interceptors:     Vec<InterceptorKind>,
}

impl SimConfig {
    /// Load a JSON config file.
    /// In tests, use SimConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: SimConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SimResult<()> {
        self.quantizer()?;
        let mut seen = HashSet::new();
        for kind in &self.systems {
            if !seen.insert(kind) {
                return Err(SimError::Config(format!("system {kind:?} registered twice")));
            }
        }
        Ok(())
    }

    pub fn quantizer(&self) -> SimResult<Quantizer> {
        Ok(Quantizer::new(self.precision_digits)?)
    }

    /// Every built-in system and both built-in interceptors with
    /// conservative settings. Checkpointing is off.
    pub fn default_test() -> Self {
        Self {
            run_id:           "test-run".into(),
            seed:             42,
            precision_digits: DEFAULT_DIGITS,
            history_depth:    None,
            checkpoint:       CheckpointPolicy::default(),
            systems: vec![
                SystemKind::Extraction,
                SystemKind::Wages,
                SystemKind::Tenancy,
                SystemKind::Consciousness,
                SystemKind::Solidarity,
                SystemKind::Uprising,
                SystemKind::Repression,
            ],
            interceptors: vec![
                InterceptorKind::CounterIntelligence { threshold: Coefficient::clamped(0.9) },
                InterceptorKind::ExtractionCap { max: Currency::clamped(1.0e9) },
            ],
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_checkpoints(mut self, interval: Tick, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint = CheckpointPolicy { interval, dir: dir.into() };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_json_with_defaults() {
        let json = r#"{
            "run_id": "r1",
            "seed": 7,
            "systems": ["extraction", "consciousness"],
            "interceptors": [{ "kind": "extraction_cap", "max": 2.5 }]
        }"#;
        let config: SimConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.precision_digits, DEFAULT_DIGITS);
        assert_eq!(config.checkpoint.interval, 0);
        assert_eq!(config.systems, vec![SystemKind::Extraction, SystemKind::Consciousness]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_duplicate_systems_and_bad_precision() {
        let mut config = SimConfig::default_test();
        config.systems.push(SystemKind::Extraction);
        assert!(matches!(config.validate(), Err(SimError::Config(_))));

        let mut config = SimConfig::default_test();
        config.precision_digits = 9;
        assert!(matches!(config.validate(), Err(SimError::Value(_))));
    }
}
