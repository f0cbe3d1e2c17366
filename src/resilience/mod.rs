//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Handler makes an outbound call (payment, messaging, ...):
//!     → registry.rs (look up the breaker for that dependency)
//!     → circuit_breaker.rs (admit or fail fast, enforce the per-call timeout,
//!       record the outcome, serve the registered fallback)
//! ```
//!
//! # Design Decisions
//! - Only the breaker enforces a hard per-call timeout
//! - Breakers are in-memory and per-process; instances trip independently
//! - Fail closed quickly toward unhealthy dependencies

pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{
    BreakerConfig, BreakerError, BreakerEvent, BreakerEventKind, BreakerStats, BreakerStatus,
    CircuitBreaker, CircuitState, ProtectedAction,
};
pub use registry::BreakerRegistry;
