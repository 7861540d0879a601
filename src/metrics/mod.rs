//! Prometheus metrics for bundle runs
//!
//! A run is a one-shot job, so instead of serving `/metrics` the registry is
//! written out in text exposition format for a node-exporter textfile
//! collector to pick up.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use std::io;
use std::path::Path;
use tracing::info;

lazy_static! {
    pub static ref TX_SIGNED: Counter = register_counter!(
        "fee_bundler_transactions_signed_total",
        "Total transactions signed"
    ).unwrap();

    pub static ref BUNDLES_SUBMITTED: Counter = register_counter!(
        "fee_bundler_bundles_submitted_total",
        "Total bundles accepted by the relay"
    ).unwrap();

    pub static ref BUNDLES_FAILED: CounterVec = register_counter_vec!(
        "fee_bundler_bundles_failed_total",
        "Total bundle runs that failed, by stage",
        &["stage"]
    ).unwrap();

    pub static ref BUNDLE_SIZE: Gauge = register_gauge!(
        "fee_bundler_bundle_size",
        "Transactions in the last assembled bundle"
    ).unwrap();

    pub static ref RELAY_LATENCY: Histogram = register_histogram!(
        "fee_bundler_relay_latency_seconds",
        "Relay submission round trip",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();
}

/// Render the default registry in text exposition format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Write the registry to `path`, replacing it atomically
pub fn write_textfile(path: &Path) -> io::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, render())?;
    std::fs::rename(&tmp, path)?;
    info!("Metrics written to {:?}", path);
    Ok(())
}

// Helper functions to record metrics

pub fn record_tx_signed(count: usize) {
    TX_SIGNED.inc_by(count as f64);
}

pub fn record_bundle_submitted(size: usize) {
    BUNDLES_SUBMITTED.inc();
    BUNDLE_SIZE.set(size as f64);
}

pub fn record_bundle_failed(stage: &str) {
    BUNDLES_FAILED.with_label_values(&[stage]).inc();
}

pub fn record_relay_latency(latency_secs: f64) {
    RELAY_LATENCY.observe(latency_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_textfile_contains_recorded_metrics() {
        record_bundle_failed("submit");
        record_tx_signed(3);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fee_bundler.prom");
        write_textfile(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("fee_bundler_bundles_failed_total{stage=\"submit\"}"));
        assert!(text.contains("fee_bundler_transactions_signed_total"));
    }
}
