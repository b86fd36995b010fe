//! Prometheus counters for the transfer workflow, exposed at `/metrics`.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref TRANSFER_TRANSITIONS: IntCounterVec = register_int_counter_vec!(
        "transfer_transitions_total",
        "Transfer transitions by kind and outcome",
        &["transition", "outcome"]
    )
    .expect("metric can be created");

    pub static ref STOCK_ADJUSTMENTS: IntCounterVec = register_int_counter_vec!(
        "stock_adjustments_total",
        "Stock ledger adjustments by location and direction",
        &["location", "direction"]
    )
    .expect("metric can be created");

    pub static ref BULK_SEND_ITEMS: IntCounterVec = register_int_counter_vec!(
        "transfer_bulk_send_items_total",
        "Items processed by bulk send by outcome",
        &["outcome"]
    )
    .expect("metric can be created");
}

/// Counts one transition attempt. `outcome` is `ok` or an error code.
pub fn record_transition(transition: &str, outcome: &str) {
    TRANSFER_TRANSITIONS
        .with_label_values(&[transition, outcome])
        .inc();
}

pub fn record_stock_adjustment(location: &str, delta: i32) {
    let direction = if delta < 0 { "debit" } else { "credit" };
    STOCK_ADJUSTMENTS
        .with_label_values(&[location, direction])
        .inc();
}

pub fn record_bulk_send_item(outcome: &str) {
    BULK_SEND_ITEMS.with_label_values(&[outcome]).inc();
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

pub async fn metrics_handler() -> Response {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
