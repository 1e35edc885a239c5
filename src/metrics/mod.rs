//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Relay outcomes per chain
//! - Transactions submitted per signer role
//! - Relay latency

use crate::error::{RelayerError, RelayerResult};
use crate::tx::SignerRole;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{error, info};

lazy_static! {
    pub static ref RELAYS_ACCEPTED: CounterVec = register_counter_vec!(
        "permit_relayer_relays_accepted_total",
        "Relay requests that passed validation",
        &["chain_id"]
    )
    .expect("metric can be registered");

    pub static ref RELAYS_REJECTED: CounterVec = register_counter_vec!(
        "permit_relayer_relays_rejected_total",
        "Relay requests rejected before any chain interaction",
        &["chain_id", "reason"]
    )
    .expect("metric can be registered");

    pub static ref RELAYS_COMPLETED: CounterVec = register_counter_vec!(
        "permit_relayer_relays_completed_total",
        "Relays where both transactions were mined",
        &["chain_id"]
    )
    .expect("metric can be registered");

    pub static ref RELAYS_FAILED: CounterVec = register_counter_vec!(
        "permit_relayer_relays_failed_total",
        "Relays that failed after submission began",
        &["chain_id", "reason"]
    )
    .expect("metric can be registered");

    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "permit_relayer_transactions_submitted_total",
        "Transactions broadcast, by signer role",
        &["chain_id", "role"]
    )
    .expect("metric can be registered");

    pub static ref RELAY_LATENCY: HistogramVec = register_histogram_vec!(
        "permit_relayer_relay_latency_seconds",
        "Time from acceptance to the final outcome of a relay",
        &["chain_id", "outcome"],
        vec![1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .expect("metric can be registered");
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> RelayerResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Current metrics in the Prometheus text format
pub fn render() -> RelayerResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| RelayerError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| RelayerError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_relay_accepted(chain_id: u64) {
    RELAYS_ACCEPTED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_relay_rejected(chain_id: u64, reason: &str) {
    RELAYS_REJECTED
        .with_label_values(&[&chain_id.to_string(), reason])
        .inc();
}

pub fn record_relay_completed(chain_id: u64, latency_secs: f64) {
    let chain = chain_id.to_string();
    RELAYS_COMPLETED.with_label_values(&[&chain]).inc();
    RELAY_LATENCY
        .with_label_values(&[&chain, "success"])
        .observe(latency_secs);
}

pub fn record_relay_failed(chain_id: u64, reason: &str, latency_secs: f64) {
    let chain = chain_id.to_string();
    RELAYS_FAILED.with_label_values(&[&chain, reason]).inc();
    RELAY_LATENCY
        .with_label_values(&[&chain, "failed"])
        .observe(latency_secs);
}

pub fn record_tx_submitted(chain_id: u64, role: SignerRole) {
    TX_SUBMITTED
        .with_label_values(&[&chain_id.to_string(), &role.to_string()])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_metrics_are_rendered() {
        record_relay_accepted(424242);
        record_tx_submitted(424242, SignerRole::FeePayer);
        record_relay_failed(424242, "Reverted", 3.0);

        let text = render().unwrap();

        assert!(text.contains("permit_relayer_relays_accepted_total{chain_id=\"424242\"}"));
        assert!(text.contains("role=\"fee-payer\""));
        assert!(text.contains("reason=\"Reverted\""));
    }
}
