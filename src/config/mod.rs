//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → handed to startup, which builds every service object from it
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new ServiceConfig sent to the running server
//!     → live-tunable settings (fault injection) are swapped in
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only fault injection is hot-swappable
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, BackendKind, BreakerSettings, CacheConfig, Environment, FaultInjectionConfig,
    IdempotencyConfig, ListenerConfig, LogFormat, ObservabilityConfig, QueueConfig, ServiceConfig,
    StoreConfig, TimeoutConfig,
};
