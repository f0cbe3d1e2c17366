//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! GET /status
//!     → status.rs
//!         breakers: registry snapshot (state, opened, rolling stats)
//!         store: ping with a short deadline
//!         queues: initialized or not
//!     → JSON report, "ok" or "degraded"
//! ```
//!
//! # Design Decisions
//! - Always answers 200; degradation is reported in the body because the
//!   service keeps serving (fail open) while dependencies are down
//! - Read-only: probing never changes breaker state

pub mod status;

pub use status::{get_status, HealthLevel, QueueHealth, StatusReport, StoreHealth};
