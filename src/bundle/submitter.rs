//! One-shot bundle submission to the relay

use super::assembler::Bundle;
use crate::config::RelayConfig;
use crate::error::{BundlerError, BundlerResult};

use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// What the relay answered to an accepted bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResponse {
    pub status: u16,
    /// Raw response body, untouched
    pub body: String,
}

/// Posts bundles to the relay endpoint. No retries.
#[derive(Debug, Clone)]
pub struct BundleSubmitter {
    /// The relay endpoint.
    url: reqwest::Url,
    /// The reqwest client used to send requests.
    client: reqwest::Client,
}

impl BundleSubmitter {
    /// Create a submitter with the given URL and client.
    pub const fn new_with_client(url: reqwest::Url, client: reqwest::Client) -> Self {
        Self { url, client }
    }

    /// Create a submitter whose requests give up after `timeout`.
    pub fn new(url: reqwest::Url, timeout: Duration) -> BundlerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BundlerError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::new_with_client(url, client))
    }

    /// Create a submitter from the relay section of the settings.
    pub fn from_config(config: &RelayConfig) -> BundlerResult<Self> {
        let url = reqwest::Url::parse(&config.url)
            .map_err(|e| BundlerError::Config(format!("Invalid relay URL {}: {}", config.url, e)))?;
        Self::new(url, config.timeout())
    }

    /// Submit `bundle` and hand back the relay's answer verbatim.
    #[instrument(skip_all, fields(txs = bundle.len(), max_block = bundle.max_block_number()))]
    pub async fn submit(&self, bundle: &Bundle) -> BundlerResult<RelayResponse> {
        let started = Instant::now();
        let response = self
            .client
            .post(self.url.clone())
            .json(&bundle.payload())
            .send()
            .await
            .inspect_err(|e| warn!(%e, "Failed to reach relay"))
            .map_err(|e| BundlerError::Submission(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BundlerError::Submission(format!("Failed to read relay response: {}", e)))?;

        crate::metrics::record_relay_latency(started.elapsed().as_secs_f64());

        if !status.is_success() {
            warn!(status = status.as_u16(), "Relay rejected bundle");
            return Err(BundlerError::RelayRejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(status = status.as_u16(), "Relay accepted bundle");
        Ok(RelayResponse {
            status: status.as_u16(),
            body,
        })
    }
}
