//! Gas price lookup for bundle transactions

use crate::chain::NodeRpc;
use crate::error::BundlerResult;

use ethers::types::U256;
use ethers::utils::format_units;
use std::sync::Arc;
use tracing::debug;

/// Gas limit of a plain value transfer, and the default for any intent
pub const DEFAULT_GAS_LIMIT: u64 = 21_000;

/// Reads the network gas price. Every call is a fresh node query.
#[derive(Clone)]
pub struct GasOracle {
    rpc: Arc<dyn NodeRpc>,
}

impl GasOracle {
    /// Create a new gas oracle
    pub fn new(rpc: Arc<dyn NodeRpc>) -> Self {
        Self { rpc }
    }

    /// Get the current gas price in wei
    pub async fn current_gas_price(&self) -> BundlerResult<U256> {
        let price = self.rpc.gas_price().await?;
        debug!(
            gwei = %format_units(price, "gwei").unwrap_or_else(|_| price.to_string()),
            "Fetched gas price"
        );
        Ok(price)
    }

    /// Calculate the worst-case cost of a transaction in wei
    pub fn calculate_cost(gas_limit: u64, gas_price: U256) -> U256 {
        U256::from(gas_limit).saturating_mul(gas_price)
    }
}
