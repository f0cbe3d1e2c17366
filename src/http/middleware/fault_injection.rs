//! Fault injection for development and test environments.
//!
//! Two independent checks run in order for every request:
//! 1. with `error_probability`, answer immediately with a synthetic 500
//! 2. otherwise, with `latency_probability`, sleep for a uniform duration in
//!    `[min_latency_ms, max_latency_ms]` and continue
//!
//! The injector refuses to activate in production regardless of its flag.
//! Settings are swapped atomically on config reload.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use rand::Rng;

use crate::config::{Environment, FaultInjectionConfig};
use crate::http::request::RequestIdExt;
use crate::observability::metrics;

/// What to do with a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultDecision {
    Pass,
    Error,
    Delay(Duration),
}

pub struct FaultInjector {
    settings: ArcSwap<FaultInjectionConfig>,
    environment: Environment,
}

impl FaultInjector {
    pub fn new(config: FaultInjectionConfig, environment: Environment) -> Self {
        let injector = Self {
            settings: ArcSwap::from_pointee(config),
            environment,
        };
        if injector.is_active() {
            tracing::warn!(settings = ?injector.settings(), "Fault injection is ACTIVE");
        }
        injector
    }

    /// Replace the live settings.
    pub fn update(&self, config: FaultInjectionConfig) {
        if *self.settings.load_full() == config {
            return;
        }
        tracing::info!(settings = ?config, "Fault injection settings updated");
        self.settings.store(Arc::new(config));
    }

    pub fn settings(&self) -> Arc<FaultInjectionConfig> {
        self.settings.load_full()
    }

    pub fn is_active(&self) -> bool {
        if self.environment == Environment::Production {
            return false;
        }
        self.settings.load().enabled
    }

    /// Roll the dice for one request.
    pub fn decide<R: Rng + ?Sized>(&self, rng: &mut R) -> FaultDecision {
        if !self.is_active() {
            return FaultDecision::Pass;
        }
        let settings = self.settings.load();

        if rng.gen_bool(probability(settings.error_probability)) {
            return FaultDecision::Error;
        }
        if rng.gen_bool(probability(settings.latency_probability)) {
            let (lo, hi) = (settings.min_latency_ms, settings.max_latency_ms);
            let ms = if lo >= hi { lo } else { rng.gen_range(lo..=hi) };
            return FaultDecision::Delay(Duration::from_millis(ms));
        }
        FaultDecision::Pass
    }

    pub async fn handle(&self, request: Request<Body>, next: Next) -> Response {
        let decision = self.decide(&mut rand::thread_rng());

        match decision {
            FaultDecision::Pass => next.run(request).await,
            FaultDecision::Error => {
                tracing::warn!(
                    request_id = %request.request_id(),
                    path = %request.uri().path(),
                    "Injected server error"
                );
                metrics::record_fault_injected("error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "Injected fault" })),
                )
                    .into_response()
            }
            FaultDecision::Delay(delay) => {
                tracing::debug!(
                    request_id = %request.request_id(),
                    delay_ms = delay.as_millis() as u64,
                    "Injected latency"
                );
                metrics::record_fault_injected("latency");
                tokio::time::sleep(delay).await;
                next.run(request).await
            }
        }
    }
}

fn probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

/// Axum middleware entry point.
pub async fn fault_injection_middleware(
    State(injector): State<Arc<FaultInjector>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    injector.handle(request, next).await
}
