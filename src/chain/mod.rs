//! Chain module - read-only access to the node the bundle is built against
//!
//! The pipeline only ever needs three queries: the gas price, the signer's
//! pending transaction count and the current block height. They are exposed
//! through [`NodeRpc`] so the pipeline can be driven against a mock node.

pub mod provider;

pub use provider::ChainProvider;

use crate::error::BundlerResult;

use async_trait::async_trait;
use ethers::types::{Address, U256};

/// Read-only node queries used while building a bundle
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Current legacy gas price in wei
    async fn gas_price(&self) -> BundlerResult<U256>;

    /// Transaction count of `address` including pending transactions
    async fn pending_transaction_count(&self, address: Address) -> BundlerResult<u64>;

    /// Latest block height
    async fn block_number(&self) -> BundlerResult<u64>;
}
