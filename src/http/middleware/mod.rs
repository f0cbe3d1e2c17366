//! Request pipeline middleware.
//!
//! # Layer Order (outermost first)
//! ```text
//! request id → trace → timeout → server-timing → fault injection
//!     → principal → idempotency (POST/PUT/PATCH) → read cache (GET/HEAD)
//!     → business handler
//! ```
//!
//! Each stateful layer is an explicitly constructed service shared by
//! `Arc` and attached with `from_fn_with_state`.

pub mod fault_injection;
pub mod idempotency;
pub mod principal;
pub mod read_cache;
pub mod timing;

pub use fault_injection::{fault_injection_middleware, FaultDecision, FaultInjector};
pub use idempotency::{
    idempotency_middleware, IdempotencyGuard, IdempotencyRecord, IDEMPOTENCY_REPLAYED,
};
pub use principal::{principal_middleware, Principal, X_PRINCIPAL_ID};
pub use read_cache::{read_cache_middleware, ReadThroughCache, CACHE_HIT_HEADER};
pub use timing::{record_stage, server_timing_middleware, ServerTiming, SERVER_TIMING};
