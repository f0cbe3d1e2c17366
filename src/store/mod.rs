//! Shared key-value store subsystem.
//!
//! # Data Flow
//! ```text
//! idempotency guard / read-through cache
//!     → KeyedStore (get / set-with-ttl / delete / flush-all)
//!     → memory.rs (process-local, tests and development)
//!     → redis_store.rs (external shared store, production)
//! ```
//!
//! # Design Decisions
//! - Callers treat every StoreError as "store unavailable" and fail open
//! - Values are opaque bytes; encoding belongs to the caller
//! - TTL is mandatory on writes; nothing this layer stores lives forever

pub mod keyed;
pub mod memory;
pub mod redis_store;

pub use keyed::{KeyedStore, StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
