//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shop_cache_lookups_total` (counter): read-through cache lookups by outcome
//! - `shop_idempotency_total` (counter): guard decisions by outcome
//! - `shop_breaker_calls_total` (counter): protected calls by breaker, outcome
//! - `shop_breaker_transitions_total` (counter): state changes by breaker, state
//! - `shop_breaker_open` (gauge): 1=open, 0=otherwise
//! - `shop_jobs_enqueued_total` (counter): enqueue attempts by queue, outcome
//! - `shop_faults_injected_total` (counter): injected faults by kind
//! - `shop_stage_duration_seconds` (histogram): middleware stage latency
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - Prometheus exposition only when enabled in config

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_cache_lookup(outcome: &'static str) {
    counter!("shop_cache_lookups_total", "outcome" => outcome).increment(1);
}

pub fn record_idempotency(outcome: &'static str) {
    counter!("shop_idempotency_total", "outcome" => outcome).increment(1);
}

pub fn record_breaker_call(breaker: &str, outcome: &'static str) {
    counter!(
        "shop_breaker_calls_total",
        "breaker" => breaker.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_breaker_transition(breaker: &str, state: &'static str) {
    counter!(
        "shop_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "state" => state
    )
    .increment(1);
    gauge!("shop_breaker_open", "breaker" => breaker.to_string())
        .set(if state == "open" { 1.0 } else { 0.0 });
}

pub fn record_enqueue(queue: &str, outcome: &'static str) {
    counter!(
        "shop_jobs_enqueued_total",
        "queue" => queue.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_fault_injected(kind: &'static str) {
    counter!("shop_faults_injected_total", "kind" => kind).increment(1);
}

pub fn record_stage_duration(stage: &'static str, elapsed: Duration) {
    histogram!("shop_stage_duration_seconds", "stage" => stage).record(elapsed.as_secs_f64());
}
