//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, probabilities within [0, 1])
//! - Keep dev-only features out of production
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{BackendKind, Environment, ServiceConfig};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid address for {field}: '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("fault injection must not be enabled in production")]
    FaultInjectionInProduction,

    #[error("fault_injection.min_latency_ms ({min}) exceeds max_latency_ms ({max})")]
    LatencyRange { min: u64, max: u64 },

    #[error("{field} is required when the redis backend is selected")]
    MissingRedisUrl { field: &'static str },

    #[error("admin.api_key must be changed before enabling the admin API in production")]
    DefaultAdminKey,

    #[error("idempotency.header_name must not be empty")]
    EmptyHeaderName,
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.request_secs".into() });
    }

    if config.store.backend == BackendKind::Redis && config.store.redis_url.is_empty() {
        errors.push(ValidationError::MissingRedisUrl { field: "store.redis_url" });
    }

    if config.queue.enabled
        && config.queue.backend == BackendKind::Redis
        && config.queue.redis_url.is_empty()
    {
        errors.push(ValidationError::MissingRedisUrl { field: "queue.redis_url" });
    }

    if config.idempotency.header_name.trim().is_empty() {
        errors.push(ValidationError::EmptyHeaderName);
    }
    if config.idempotency.ttl_secs == 0 {
        errors.push(ValidationError::Zero { field: "idempotency.ttl_secs".into() });
    }
    if config.cache.ttl_secs == 0 {
        errors.push(ValidationError::Zero { field: "cache.ttl_secs".into() });
    }

    for (name, breaker) in &config.breakers {
        if breaker.timeout_ms == 0 {
            errors.push(ValidationError::Zero { field: format!("breakers.{name}.timeout_ms") });
        }
        if breaker.reset_timeout_ms == 0 {
            errors.push(ValidationError::Zero {
                field: format!("breakers.{name}.reset_timeout_ms"),
            });
        }
        if breaker.rolling_window_ms == 0 {
            errors.push(ValidationError::Zero {
                field: format!("breakers.{name}.rolling_window_ms"),
            });
        }
        if breaker.rolling_buckets == 0 {
            errors.push(ValidationError::Zero {
                field: format!("breakers.{name}.rolling_buckets"),
            });
        }
        check_range(
            &mut errors,
            format!("breakers.{name}.error_threshold_pct"),
            breaker.error_threshold_pct,
            0.0,
            100.0,
        );
    }

    let faults = &config.fault_injection;
    if faults.enabled && config.environment == Environment::Production {
        errors.push(ValidationError::FaultInjectionInProduction);
    }
    check_range(
        &mut errors,
        "fault_injection.error_probability".into(),
        faults.error_probability,
        0.0,
        1.0,
    );
    check_range(
        &mut errors,
        "fault_injection.latency_probability".into(),
        faults.latency_probability,
        0.0,
        1.0,
    );
    if faults.min_latency_ms > faults.max_latency_ms {
        errors.push(ValidationError::LatencyRange {
            min: faults.min_latency_ms,
            max: faults.max_latency_ms,
        });
    }

    if config.admin.enabled
        && config.environment == Environment::Production
        && config.admin.api_key == crate::config::schema::AdminConfig::default().api_key
    {
        errors.push(ValidationError::DefaultAdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_range(errors: &mut Vec<ValidationError>, field: String, value: f64, min: f64, max: f64) {
    // NaN fails both comparisons, so test for containment.
    if !(min..=max).contains(&value) {
        errors.push(ValidationError::OutOfRange { field, value, min, max });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BreakerSettings;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn test_fault_injection_rejected_in_production() {
        let mut config = ServiceConfig::default();
        config.environment = Environment::Production;
        config.fault_injection.enabled = true;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::FaultInjectionInProduction));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.fault_injection.error_probability = 1.5;
        config.fault_injection.min_latency_ms = 500;
        config.fault_injection.max_latency_ms = 100;
        config.breakers.insert(
            "payments".into(),
            BreakerSettings {
                timeout_ms: 0,
                error_threshold_pct: 120.0,
                ..BreakerSettings::default()
            },
        );

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5, "{errors:?}");
        assert!(errors
            .iter()
            .any(|e| e.to_string() == "breakers.payments.timeout_ms must be greater than zero"));
    }

    #[test]
    fn test_nan_probability_is_rejected() {
        let mut config = ServiceConfig::default();
        config.fault_injection.latency_probability = f64::NAN;
        assert!(validate_config(&config).is_err());
    }
}
