//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_queries_total` (counter): finished queries by outcome
//! - `gateway_query_duration_seconds` (histogram): admission to completion
//! - `gateway_in_flight` (gauge): admitted queries not yet finished
//! - `gateway_dropped_responses_total` (counter): responses with no waiting caller
//! - `gateway_backend_read_errors_total` (counter): tolerated read/decode errors
//! - `gateway_backend_connection_up` (gauge): 1 while a pooled connection is usable
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_query(outcome: &'static str, started: Instant) {
    counter!("gateway_queries_total", "outcome" => outcome).increment(1);
    histogram!("gateway_query_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn adjust_in_flight(delta: f64) {
    gauge!("gateway_in_flight").increment(delta);
}

pub fn record_dropped_response() {
    counter!("gateway_dropped_responses_total").increment(1);
}

pub fn record_read_error(connection: usize) {
    counter!("gateway_backend_read_errors_total", "connection" => connection.to_string())
        .increment(1);
}

pub fn record_backend_connection(connection: usize, up: bool) {
    gauge!("gateway_backend_connection_up", "connection" => connection.to_string())
        .set(if up { 1.0 } else { 0.0 });
}
