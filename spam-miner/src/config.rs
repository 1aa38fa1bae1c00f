//! Configuration loader for spam-miner

use anyhow::{Context, Result};
use core_logic::SpamConfig;
use serde::Deserialize;
use std::fs;

/// Full miner configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    /// Identity, endpoints, and operating mode
    pub spam: SpamConfig,
    /// Transactions on one endpoint before rotating to the next
    #[serde(default = "default_rotation_threshold")]
    pub rotation_threshold: u32,
    /// Number of concurrent miner instances (distinct identities)
    #[serde(default = "default_workers")]
    pub workers: u64,
    #[serde(default)]
    pub policy: CyclePolicy,
}

fn default_rotation_threshold() -> u32 {
    20
}

fn default_workers() -> u64 {
    1
}

/// Timing and penalty knobs for the cycle loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CyclePolicy {
    /// Warm-up pause after switching endpoints
    pub warmup_ms: u64,
    /// Cool-down after a benign epoch rollover
    pub epoch_cooldown_ms: u64,
    /// Sleep after an endpoint-lag failure
    pub lag_ms: u64,
    /// Sleep after a network fetch failure
    pub network_ms: u64,
    /// Sleep after an unclassified failure
    pub unexpected_ms: u64,
    /// Fixed delay between transient submission retries inside the client
    pub submit_retry_delay_ms: u64,
    /// Added to the rotation counter when an endpoint misbehaves, hastening
    /// the next rotation
    pub rotation_penalty: u32,
}

impl Default for CyclePolicy {
    fn default() -> Self {
        Self {
            warmup_ms: 500,
            epoch_cooldown_ms: 30_000,
            lag_ms: 1_000,
            network_ms: 5_000,
            unexpected_ms: 5_000,
            submit_retry_delay_ms: 1_000,
            rotation_penalty: 10,
        }
    }
}

impl MinerConfig {
    /// Load configuration from a TOML file
    ///
    /// # Example
    /// ```ignore
    /// let config = MinerConfig::from_path("config/miner.toml")?;
    /// ```
    pub fn from_path(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read config from {}", path))?;
        let config: Self = toml::from_str(&content).context("Failed to parse config TOML")?;
        config.spam.validate().context("Invalid spam configuration")?;
        Ok(config)
    }
}
