//! # Prometheus Metrics
//!
//! Exposes operational metrics for the ledger node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

use guard_contracts::{Ledger, LedgerResult, LedgerSummary};

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are reference-counted) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Ledger operations, labelled by operation and outcome (`ok` or an error code).
    pub operations_total: IntCounterVec,
    /// Current number of records in each status.
    pub transactions_by_status: IntGaugeVec,
    /// Length of the audit log.
    pub audit_events: IntGauge,
    /// Histogram of ledger operation latency in seconds, by operation.
    pub operation_latency_seconds: HistogramVec,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("guard".into()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Ledger operations by operation and outcome"),
            &["op", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let transactions_by_status = IntGaugeVec::new(
            Opts::new("transactions", "Current number of records in each status"),
            &["status"],
        )?;
        registry.register(Box::new(transactions_by_status.clone()))?;

        let audit_events = IntGauge::new("audit_events", "Number of events in the audit log")?;
        registry.register(Box::new(audit_events.clone()))?;

        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Ledger operation latency in seconds, including the storage commit",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
            &["op"],
        )?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            transactions_by_status,
            audit_events,
            operation_latency_seconds,
        })
    }

    /// Records one ledger operation's outcome and latency.
    pub fn observe<T>(&self, op: &str, result: &LedgerResult<T>, elapsed: Duration) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => e.kind().as_str(),
        };
        self.operations_total.with_label_values(&[op, outcome]).inc();
        self.operation_latency_seconds
            .with_label_values(&[op])
            .observe(elapsed.as_secs_f64());
    }

    /// Refreshes the gauges from a ledger summary.
    pub fn refresh(&self, summary: &LedgerSummary) {
        for (status, count) in &summary.by_status {
            self.transactions_by_status
                .with_label_values(&[status.as_str()])
                .set(*count as i64);
        }
        self.audit_events.set(summary.events as i64);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics handle passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// State for the metrics server. The ledger is read on each scrape to
/// refresh the gauges.
#[derive(Clone)]
pub struct MetricsState {
    pub metrics: SharedMetrics,
    pub ledger: Arc<Ledger>,
}

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<MetricsState>,
) -> impl IntoResponse {
    let ledger = Arc::clone(&state.ledger);
    // The ledger lock can be held across a disk flush.
    let summary = match tokio::task::spawn_blocking(move || ledger.summary()).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("failed to read ledger summary: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "ledger summary failed").into_response();
        }
    };
    state.metrics.refresh(&summary);
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
