//! `Server-Timing` instrumentation.
//!
//! Middleware stages record named durations into a per-request collector; the
//! outermost layer renders them, plus the total, into the response header.
//! Purely informational: nothing reads these values back.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;

use crate::observability::metrics;

pub const SERVER_TIMING: HeaderName = HeaderName::from_static("server-timing");

/// Per-request collector of named durations, carried in request extensions.
#[derive(Debug, Clone, Default)]
pub struct ServerTiming {
    entries: Arc<Mutex<Vec<(&'static str, Duration)>>>,
}

impl ServerTiming {
    pub fn record(&self, name: &'static str, elapsed: Duration) {
        metrics::record_stage_duration(name, elapsed);
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name, elapsed));
    }

    /// Render as `name;dur=<ms>` entries followed by `total`.
    pub fn header_value(&self, total: Duration) -> String {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .chain(std::iter::once(&("total", total)))
            .map(|(name, d)| format!("{name};dur={:.3}", d.as_secs_f64() * 1000.0))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Record `elapsed` under `name` if the request carries a collector.
pub fn record_stage<B>(request: &Request<B>, name: &'static str, elapsed: Duration) {
    if let Some(timing) = request.extensions().get::<ServerTiming>() {
        timing.record(name, elapsed);
    }
}

/// Install a collector and emit the `Server-Timing` header.
pub async fn server_timing_middleware(mut request: Request<Body>, next: Next) -> Response {
    let timing = ServerTiming::default();
    request.extensions_mut().insert(timing.clone());

    let start = Instant::now();
    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&timing.header_value(start.elapsed())) {
        response.headers_mut().append(SERVER_TIMING, value);
    }
    response
}
