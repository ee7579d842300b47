//! Configuration for the order manager core.
//!
//! Supports loading from a TOML file with environment variable overrides.

use std::path::Path;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Logging level: trace, debug, info, warn, error.
    pub log_level: String,

    /// Order manager tunables.
    pub order_manager: OrderManagerOptions,

    /// Owners excluded from the miner feed.
    pub whitelist: WhitelistConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            order_manager: OrderManagerOptions::default(),
            whitelist: WhitelistConfig::default(),
        }
    }
}

/// Tunables for the lifecycle engine and miner feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrderManagerOptions {
    /// Blocks a miner-excluded order stays hidden.
    pub block_period: u64,

    /// Blocks a fund-insufficient order stays hidden.
    pub account_period: u64,

    /// Market-value floor, in whole base-currency units of the oracle.
    /// Remaining value below this counts as fully finished; available
    /// value below this counts as fund-insufficient.
    pub value_threshold: u64,

    /// Grace period the fork quiesce waits for in-flight handlers.
    pub quiesce_grace_ms: u64,
}

impl Default for OrderManagerOptions {
    fn default() -> Self {
        Self {
            block_period: 3,
            account_period: 100,
            value_threshold: 1,
            quiesce_grace_ms: 5_000,
        }
    }
}

impl OrderManagerOptions {
    pub fn quiesce_grace(&self) -> Duration {
        Duration::from_millis(self.quiesce_grace_ms)
    }

    pub fn value_threshold(&self) -> U256 {
        U256::from(self.value_threshold)
    }
}

/// Owner whitelist loaded from configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WhitelistConfig {
    pub owners: Vec<Address>,
}

impl RelayConfig {
    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let mut config: RelayConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {:?}", path))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment variable overrides, applied after file load.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("RELAY_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(period) = std::env::var("RELAY_BLOCK_PERIOD") {
            if let Ok(period) = period.parse() {
                self.order_manager.block_period = period;
            }
        }
        if let Ok(period) = std::env::var("RELAY_ACCOUNT_PERIOD") {
            if let Ok(period) = period.parse() {
                self.order_manager.account_period = period;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.order_manager.block_period == 0 {
            bail!("order_manager.block_period must be positive");
        }
        if self.order_manager.account_period == 0 {
            bail!("order_manager.account_period must be positive");
        }
        Ok(())
    }
}
