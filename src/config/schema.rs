//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the resilience service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Runtime environment; gates dev-only features.
    pub environment: Environment,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Shared key-value store backing the guard and the cache.
    pub store: StoreConfig,

    /// Idempotent replay of mutating requests.
    pub idempotency: IdempotencyConfig,

    /// Read-through response cache.
    pub cache: CacheConfig,

    /// Named circuit breakers, created once at startup.
    pub breakers: BTreeMap<String, BreakerSettings>,

    /// Background job producer.
    pub queue: QueueConfig,

    /// Failure injection (development and test only).
    pub fault_injection: FaultInjectionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Runtime environment.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Timeout for connecting to the shared store at startup, in seconds.
    pub store_connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            store_connect_secs: 5,
        }
    }
}

/// Which implementation backs a store or queue.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Redis,
}

/// Shared key-value store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,

    /// Redis connection URL (only used with the redis backend).
    pub redis_url: String,

    /// Prefix applied to every key written by this service.
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "shop".to_string(),
        }
    }
}

/// Idempotency guard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub enabled: bool,

    /// Request header carrying the client-supplied key.
    pub header_name: String,

    /// Lifetime of a stored record in seconds (24h).
    pub ttl_secs: u64,

    /// Responses larger than this are delivered but not recorded.
    pub max_body_bytes: usize,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            header_name: "Idempotency-Key".to_string(),
            ttl_secs: 24 * 60 * 60,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl IdempotencyConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Read-through cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Entry lifetime in seconds.
    pub ttl_secs: u64,

    /// Responses larger than this are served but not cached.
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Settings for a single named circuit breaker.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BreakerSettings {
    /// Per-call deadline in milliseconds. Exceeding it trips the breaker.
    pub timeout_ms: u64,

    /// Failure percentage (0-100) above which the breaker opens.
    pub error_threshold_pct: f64,

    /// Time spent open before a trial call is allowed, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Minimum calls in the rolling window before the failure rate is evaluated.
    pub min_samples: u32,

    /// Length of the rolling statistics window in milliseconds.
    pub rolling_window_ms: u64,

    /// Number of buckets the rolling window is split into.
    pub rolling_buckets: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            error_threshold_pct: 50.0,
            reset_timeout_ms: 30_000,
            min_samples: 5,
            rolling_window_ms: 10_000,
            rolling_buckets: 10,
        }
    }
}

/// Background job queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// When disabled, every queue reference is left uninitialized.
    pub enabled: bool,

    pub backend: BackendKind,

    /// Redis connection URL (only used with the redis backend).
    pub redis_url: String,

    /// Prefix for queue keys.
    pub key_prefix: String,

    /// Queue names the service produces to.
    pub queues: Vec<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: BackendKind::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "jobs".to_string(),
            queues: vec!["notifications".to_string()],
        }
    }
}

/// Failure injection configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FaultInjectionConfig {
    pub enabled: bool,

    /// Probability (0.0-1.0) of answering with a synthetic 500.
    pub error_probability: f64,

    /// Probability (0.0-1.0) of delaying a request that was not short-circuited.
    pub latency_probability: f64,

    /// Lower bound of the injected delay in milliseconds.
    pub min_latency_ms: u64,

    /// Upper bound of the injected delay in milliseconds.
    pub max_latency_ms: u64,
}

impl Default for FaultInjectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            error_probability: 0.05,
            latency_probability: 0.1,
            min_latency_ms: 100,
            max_latency_ms: 2_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
