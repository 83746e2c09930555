//! Prometheus metrics endpoint.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use metrics::{Unit, describe_counter, describe_histogram};
use metrics_exporter_prometheus::PrometheusHandle;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Registers help text for the order metrics. Call once after the recorder
/// is installed.
pub fn describe() {
    describe_counter!("orders_placed_total", "Orders committed");
    describe_counter!(
        "order_placement_failures_total",
        "Placements that returned an error, by error kind"
    );
    describe_counter!(
        "order_code_conflicts_total",
        "Order code collisions that triggered a retry"
    );
    describe_histogram!(
        "order_placement_duration_seconds",
        Unit::Seconds,
        "End to end placement latency"
    );
    describe_counter!(
        "order_status_updates_total",
        "Lifecycle updates written"
    );
    describe_counter!(
        "order_notifications_failed_total",
        "Order confirmations that could not be sent"
    );
}

/// GET /metrics: Prometheus text exposition.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        handle.render(),
    )
}
