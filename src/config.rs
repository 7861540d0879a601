//! Configuration management for the fee bundler
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::tx::{parse_native_amount, TransactionIntent};

use anyhow::{Context, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub chain: ChainConfig,
    pub fee: FeeConfig,
    pub wallet: WalletConfig,
    pub relay: RelayConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub transactions: Vec<TransactionIntent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    /// Address receiving the aggregated fee transfer
    pub collector: Address,
    /// Fee charged per user transaction, in native units
    pub base_fee_per_tx: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Name of the environment variable holding the signing key
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub url: String,
    #[serde(default = "default_block_window")]
    pub block_window: u64,
    #[serde(default = "default_relay_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// Where to write the text exposition after a run
    pub textfile_path: Option<PathBuf>,
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_private_key_env() -> String {
    "BUNDLER_PRIVATE_KEY".to_string()
}

fn default_block_window() -> u64 {
    100
}

fn default_relay_timeout_secs() -> u64 {
    30
}

impl ChainConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RelayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    /// Load settings from the file named by `BUNDLER_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("BUNDLER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chain.chain_id == 0 {
            anyhow::bail!("chain.chain_id must be non-zero");
        }
        if self.chain.rpc_url.is_empty() {
            anyhow::bail!("chain.rpc_url is not configured");
        }
        if self.chain.request_timeout_secs == 0 || self.relay.timeout_secs == 0 {
            anyhow::bail!("Request timeouts must be at least one second");
        }
        if self.relay.block_window == 0 {
            anyhow::bail!("relay.block_window must be positive");
        }

        reqwest::Url::parse(&self.relay.url)
            .with_context(|| format!("Invalid relay URL: {}", self.relay.url))?;

        parse_native_amount("fee.base_fee_per_tx", &self.fee.base_fee_per_tx)
            .with_context(|| "Invalid fee.base_fee_per_tx")?;

        if self.wallet.private_key_env.is_empty() {
            anyhow::bail!("wallet.private_key_env is empty");
        }

        if self.transactions.is_empty() {
            tracing::warn!("No user transactions configured - bundle will only carry the fee transfer");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
