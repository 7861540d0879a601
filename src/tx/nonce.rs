//! Nonce allocation for a single-signer bundle
//!
//! The bundle is ordered by nonce, so the allocator hands out one contiguous
//! run starting at the signer's pending nonce. Two runs sharing a signer
//! would race on that starting point; one signer per run is assumed.

use crate::chain::NodeRpc;
use crate::error::{BundlerError, BundlerResult};

use ethers::types::Address;
use std::sync::Arc;
use tracing::debug;

/// Sources the pending nonce and splits it into per-transaction nonces
#[derive(Clone)]
pub struct NonceAllocator {
    rpc: Arc<dyn NodeRpc>,
}

impl NonceAllocator {
    /// Create a new nonce allocator
    pub fn new(rpc: Arc<dyn NodeRpc>) -> Self {
        Self { rpc }
    }

    /// Fetch the next unused nonce of `address`, counting pending transactions
    pub async fn fetch_pending(&self, address: Address) -> BundlerResult<u64> {
        let nonce = self.rpc.pending_transaction_count(address).await?;
        debug!("Pending nonce for {:?}: {}", address, nonce);
        Ok(nonce)
    }

    /// Allocate `count` nonces starting at `start`, in submission order
    pub fn allocate(start: u64, count: usize) -> BundlerResult<Vec<u64>> {
        let count = u64::try_from(count).map_err(|_| BundlerError::Oracle {
            query: "eth_getTransactionCount",
            message: format!("cannot allocate {} nonces", count),
        })?;

        let end = start.checked_add(count).ok_or_else(|| BundlerError::Oracle {
            query: "eth_getTransactionCount",
            message: format!("pending nonce {} leaves no room for {} transactions", start, count),
        })?;

        Ok((start..end).collect())
    }
}
