//! Node provider over ethers' HTTP transport with bounded request times

use super::NodeRpc;
use crate::config::ChainConfig;
use crate::error::{BundlerError, BundlerResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// HTTP node provider for a single chain
pub struct ChainProvider {
    /// HTTP provider
    http: Provider<Http>,
    /// Expected chain ID
    chain_id: u64,
    /// Upper bound for any single request
    request_timeout: Duration,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: &ChainConfig) -> BundlerResult<Self> {
        let http = Provider::<Http>::try_from(config.rpc_url.as_str()).map_err(|e| {
            BundlerError::Config(format!("Invalid RPC URL {}: {}", config.rpc_url, e))
        })?;

        debug!("HTTP provider for chain {}: {}", config.chain_id, config.rpc_url);

        Ok(Self {
            http,
            chain_id: config.chain_id,
            request_timeout: config.request_timeout(),
        })
    }

    /// Run a node query under the request timeout
    async fn bounded<T, E, F>(&self, query: &'static str, fut: F) -> BundlerResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match timeout(self.request_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(BundlerError::Oracle {
                query,
                message: e.to_string(),
            }),
            Err(_) => {
                warn!("{} on chain {} timed out", query, self.chain_id);
                Err(BundlerError::Oracle {
                    query,
                    message: format!("timed out after {:?}", self.request_timeout),
                })
            }
        }
    }
}

#[async_trait]
impl NodeRpc for ChainProvider {
    async fn gas_price(&self) -> BundlerResult<U256> {
        self.bounded("eth_gasPrice", self.http.get_gas_price()).await
    }

    async fn pending_transaction_count(&self, address: Address) -> BundlerResult<u64> {
        let block = Some(BlockId::Number(BlockNumber::Pending));
        let count = self
            .bounded(
                "eth_getTransactionCount",
                self.http.get_transaction_count(address, block),
            )
            .await?;

        if count > U256::from(u64::MAX) {
            return Err(BundlerError::Oracle {
                query: "eth_getTransactionCount",
                message: format!("transaction count {} does not fit a nonce", count),
            });
        }
        Ok(count.as_u64())
    }

    async fn block_number(&self) -> BundlerResult<u64> {
        let block = self
            .bounded("eth_blockNumber", self.http.get_block_number())
            .await?;
        Ok(block.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_config(rpc_url: &str) -> ChainConfig {
        ChainConfig {
            rpc_url: rpc_url.to_string(),
            chain_id: 56,
            request_timeout_secs: 1,
        }
    }

    #[test]
    fn test_rejects_invalid_rpc_url() {
        let result = ChainProvider::new(&chain_config("not a url"));
        assert!(matches!(result, Err(BundlerError::Config(_))));
    }

    #[tokio::test]
    async fn test_reads_block_number_from_node() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x3e8"}"#)
            .expect(1)
            .create_async()
            .await;

        let provider = ChainProvider::new(&chain_config(&server.url())).unwrap();
        assert_eq!(provider.block_number().await.unwrap(), 1000);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_node_error_is_oracle_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"down"}}"#)
            .create_async()
            .await;

        let provider = ChainProvider::new(&chain_config(&server.url())).unwrap();
        let err = provider.gas_price().await.unwrap_err();
        assert!(matches!(
            err,
            BundlerError::Oracle {
                query: "eth_gasPrice",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_slow_node_times_out_as_oracle_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_secs(3));
                w.write_all(br#"{"jsonrpc":"2.0","id":1,"result":"0x3e8"}"#)
            })
            .expect(1)
            .create_async()
            .await;

        let provider = ChainProvider::new(&chain_config(&server.url())).unwrap();
        let started = std::time::Instant::now();
        let err = provider.block_number().await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(3));
        match err {
            BundlerError::Oracle { query, message } => {
                assert_eq!(query, "eth_blockNumber");
                assert!(message.contains("timed out"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
        mock.assert_async().await;
    }
}
