//! Fee Bundler - builds a fee-prefixed transaction bundle and submits it to a relay
//!
//! The bundle carries one fee transfer followed by the configured user
//! transactions, all signed by one key with contiguous nonces, and is only
//! valid for a fixed window of blocks.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

mod bundle;
mod chain;
mod config;
mod error;
mod metrics;
mod pipeline;
mod tx;

use chain::ChainProvider;
use config::Settings;
use pipeline::BundlePipeline;
use tx::TransactionSigner;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Fee Bundler v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for chain {} with {} user transactions",
        settings.chain.chain_id,
        settings.transactions.len()
    );

    let signer = Arc::new(
        TransactionSigner::from_env(&settings.wallet.private_key_env, settings.chain.chain_id)
            .context("Failed to load signing key")?,
    );
    info!("Signing as {:?}", signer.address());

    let provider = Arc::new(ChainProvider::new(&settings.chain)?);
    let pipeline = BundlePipeline::from_settings(&settings, provider, signer)?;

    let span = info_span!("bundle", run_id = %Uuid::new_v4());
    let outcome = pipeline.run(&settings.transactions).instrument(span).await;

    if let Some(path) = &settings.metrics.textfile_path {
        if let Err(e) = metrics::write_textfile(path) {
            warn!("Failed to write metrics to {:?}: {}", path, e);
        }
    }

    let response = outcome.context("Bundle submission failed")?;
    info!("Bundle submitted successfully (status {})", response.status);
    println!("{}", response.body);

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fee_bundler=debug,hyper=warn,reqwest=warn"));

    // stdout carries only the relay response
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}
