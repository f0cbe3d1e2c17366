//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, ambient layers)
//!     → request.rs (request id for correlation)
//!     → middleware/ (timing, faults, principal, idempotency, cache)
//!     → business handler
//!     → response.rs (buffer final response for record/replay)
//!     → client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use response::{BufferedResponse, CaptureError, Captured};
pub use server::{AppServer, AppState};
