//! Resilience middleware for an e-commerce backend.
//!
//! Idempotent replay of mutating requests, a read-through response cache,
//! circuit breakers around outbound calls, fire-and-forget job dispatch and
//! development-time fault injection, composed as axum/tower middleware.

pub mod admin;
pub mod config;
pub mod health;
pub mod http;
pub mod jobs;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod shop;
pub mod store;

pub use config::schema::ServiceConfig;
pub use http::AppServer;
pub use lifecycle::{Services, Shutdown};
