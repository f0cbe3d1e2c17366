//! Payment capture behind the `payments` circuit breaker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resilience::{CircuitBreaker, ProtectedAction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub order_id: u64,
    pub amount_cents: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// The provider confirmed the charge.
    Captured,
    /// The provider could not be reached; capture happens out of band.
    Deferred,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment provider unavailable")]
    Unavailable,
}

/// In-process stand-in for an external payment provider.
///
/// Failure and latency can be switched at runtime to drive the breaker.
#[derive(Debug, Clone, Default)]
pub struct SimulatedGateway {
    failing: Arc<AtomicBool>,
    latency_ms: Arc<AtomicU64>,
    attempts: Arc<AtomicU64>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Calls that reached the provider.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn charge(&self, charge: Charge) -> Result<PaymentStatus, PaymentError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(PaymentError::Unavailable);
        }
        tracing::debug!(order_id = charge.order_id, amount_cents = charge.amount_cents, "Charge captured");
        Ok(PaymentStatus::Captured)
    }
}

pub type PaymentAction = ProtectedAction<Charge, PaymentStatus, PaymentError>;

/// Bind the gateway to `breaker`, deferring capture whenever the call cannot succeed.
pub fn protected_charge(breaker: Arc<CircuitBreaker>, gateway: SimulatedGateway) -> PaymentAction {
    ProtectedAction::new(breaker, move |charge: Charge| {
        let gateway = gateway.clone();
        async move { gateway.charge(charge).await }
    })
    .with_fallback(|charge, err| {
        tracing::warn!(order_id = charge.order_id, error = %err, "Payment deferred");
        PaymentStatus::Deferred
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{BreakerConfig, CircuitState};

    fn breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "payments",
            BreakerConfig {
                timeout: Duration::from_millis(50),
                min_samples: 2,
                ..BreakerConfig::default()
            },
        ))
    }

    fn charge(order_id: u64) -> Charge {
        Charge {
            order_id,
            amount_cents: 1_000,
        }
    }

    #[tokio::test]
    async fn test_capture_when_healthy() {
        let gateway = SimulatedGateway::new();
        let payments = protected_charge(breaker(), gateway.clone());
        assert_eq!(payments.execute(charge(1)).await.unwrap(), PaymentStatus::Captured);
        assert_eq!(gateway.attempts(), 1);
    }

    #[tokio::test]
    async fn test_outage_defers_then_stops_calling() {
        let gateway = SimulatedGateway::new();
        gateway.set_failing(true);
        let payments = protected_charge(breaker(), gateway.clone());

        for id in 0..2 {
            assert_eq!(payments.execute(charge(id)).await.unwrap(), PaymentStatus::Deferred);
        }
        assert_eq!(payments.breaker().state(), CircuitState::Open);

        // Open: fallback served without touching the provider.
        assert_eq!(payments.execute(charge(3)).await.unwrap(), PaymentStatus::Deferred);
        assert_eq!(gateway.attempts(), 2);
        assert_eq!(payments.breaker().status().stats.fallback_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_defers() {
        let gateway = SimulatedGateway::new();
        gateway.set_latency(Duration::from_millis(500));
        let payments = protected_charge(breaker(), gateway);

        assert_eq!(payments.execute(charge(1)).await.unwrap(), PaymentStatus::Deferred);
        assert_eq!(payments.breaker().state(), CircuitState::Open);
    }
}
