//! The KeyedStore contract.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a key-value store.
///
/// Middleware never propagates these to clients.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or refused the command.
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer in time.
    #[error("key-value store timed out after {0:?}")]
    Timeout(Duration),
}

/// Thin interface over an external shared key-value cache.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Fetch a value; `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store a value that expires after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Remove every key in the store.
    ///
    /// **Warning:** this affects all cached entries system-wide.
    async fn flush_all(&self) -> StoreResult<()>;

    /// Cheap reachability probe for health reporting.
    async fn ping(&self) -> StoreResult<()>;
}
