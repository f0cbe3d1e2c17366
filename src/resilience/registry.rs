//! Named breaker registry.
//!
//! # Responsibilities
//! - Build one breaker per protected action from configuration
//! - Hand out shared breakers by name
//! - Snapshot every breaker for the status endpoint

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::BreakerSettings;
use crate::resilience::circuit_breaker::{BreakerConfig, BreakerStatus, CircuitBreaker};

/// Owns the process-local breakers. Constructed explicitly and shared via Arc.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding one breaker per configured name.
    pub fn from_config(settings: &BTreeMap<String, BreakerSettings>) -> Self {
        let registry = Self::new();
        for (name, s) in settings {
            registry.register(name, BreakerConfig::from(s));
            tracing::debug!(
                breaker = %name,
                timeout_ms = s.timeout_ms,
                error_threshold_pct = s.error_threshold_pct,
                reset_timeout_ms = s.reset_timeout_ms,
                min_samples = s.min_samples,
                "Circuit breaker registered"
            );
        }
        registry
    }

    /// Return the breaker named `name`, creating it with `config` if absent.
    ///
    /// An existing breaker keeps its original configuration.
    pub fn register(&self, name: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Status of every breaker, ordered by name.
    pub fn snapshot(&self) -> Vec<BreakerStatus> {
        let mut statuses: Vec<_> = self.breakers.iter().map(|r| r.value().status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// True if any breaker is currently open.
    pub fn any_open(&self) -> bool {
        self.breakers.iter().any(|r| r.value().status().opened)
    }
}
