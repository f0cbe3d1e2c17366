//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the shared store, the queue producers and the breaker registry
//! - Construct each middleware service explicitly from configuration
//!
//! # Design Decisions
//! - Fail fast: an unreachable store backend is fatal at startup
//! - An unreachable queue backend is not: its queues are left uninitialized
//!   and enqueue becomes a logged no-op
//! - Subsystems initialize in order, not concurrently

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{BackendKind, ConfigError, ServiceConfig};
use crate::http::middleware::{FaultInjector, IdempotencyGuard, ReadThroughCache};
use crate::jobs::{AsyncJobDispatcher, MemoryQueue, QueueProducer, QueueRef, RedisQueue};
use crate::resilience::BreakerRegistry;
use crate::store::{KeyedStore, MemoryStore, RedisStore, StoreError};

/// Fatal startup failures.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("store backend unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// Every long-lived service the request pipeline depends on.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn KeyedStore>,
    pub breakers: Arc<BreakerRegistry>,
    pub dispatcher: Arc<AsyncJobDispatcher>,
    pub faults: Arc<FaultInjector>,
    pub idempotency: Arc<IdempotencyGuard>,
    pub cache: Arc<ReadThroughCache>,
}

impl Services {
    /// Assemble services around an already-built store and queue producer.
    ///
    /// With `queue` set to `None`, every configured queue is uninitialized.
    pub fn assemble(
        config: &ServiceConfig,
        store: Arc<dyn KeyedStore>,
        queue: Option<Arc<dyn QueueProducer>>,
    ) -> Self {
        let queues = config.queue.queues.iter().map(|name| match &queue {
            Some(producer) => QueueRef::new(name.clone(), producer.clone()),
            None => QueueRef::uninitialized(name.clone()),
        });

        Self {
            breakers: Arc::new(BreakerRegistry::from_config(&config.breakers)),
            dispatcher: Arc::new(AsyncJobDispatcher::new(queues)),
            faults: Arc::new(FaultInjector::new(
                config.fault_injection.clone(),
                config.environment,
            )),
            idempotency: Arc::new(IdempotencyGuard::new(
                store.clone(),
                config.idempotency.clone(),
            )),
            cache: Arc::new(ReadThroughCache::new(store.clone(), config.cache.clone())),
            store,
        }
    }

    /// Services backed entirely by in-process fakes.
    pub fn in_memory(config: &ServiceConfig) -> Self {
        Self::assemble(
            config,
            Arc::new(MemoryStore::new()),
            Some(Arc::new(MemoryQueue::new())),
        )
    }
}

/// Build services from configuration, connecting to external backends.
pub async fn build_services(config: &ServiceConfig) -> Result<Services, StartupError> {
    let connect_timeout = Duration::from_secs(config.timeouts.store_connect_secs);

    let store: Arc<dyn KeyedStore> = match config.store.backend {
        BackendKind::Memory => {
            tracing::info!("Using in-memory store");
            Arc::new(MemoryStore::new())
        }
        BackendKind::Redis => {
            let store = RedisStore::connect(
                &config.store.redis_url,
                config.store.key_prefix.clone(),
                connect_timeout,
            )
            .await?;
            tracing::info!(prefix = %config.store.key_prefix, "Connected to redis store");
            Arc::new(store)
        }
    };

    let queue = build_queue(config, connect_timeout).await;
    let services = Services::assemble(config, store, queue);

    tracing::info!(
        breakers = services.breakers.len(),
        queues = config.queue.queues.len(),
        idempotency = config.idempotency.enabled,
        cache = config.cache.enabled,
        faults = services.faults.is_active(),
        "Services initialized"
    );
    Ok(services)
}

async fn build_queue(
    config: &ServiceConfig,
    connect_timeout: Duration,
) -> Option<Arc<dyn QueueProducer>> {
    if !config.queue.enabled {
        tracing::info!("Job queue disabled; enqueue is a no-op");
        return None;
    }
    match config.queue.backend {
        BackendKind::Memory => Some(Arc::new(MemoryQueue::new())),
        BackendKind::Redis => match RedisQueue::connect(
            &config.queue.redis_url,
            config.queue.key_prefix.clone(),
            connect_timeout,
        )
        .await
        {
            Ok(queue) => Some(Arc::new(queue)),
            Err(e) => {
                tracing::warn!(error = %e, "Job queue unavailable; queues left uninitialized");
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_config_builds_in_memory_services() {
        let config = ServiceConfig::default();
        let services = build_services(&config).await.unwrap();

        assert!(services.store.ping().await.is_ok());
        assert!(services.breakers.is_empty());
        assert!(!services.faults.is_active());
        // queue disabled by default
        assert!(!services.dispatcher.queue("notifications").is_initialized());
    }

    #[tokio::test]
    async fn test_enabled_memory_queue_is_initialized() {
        let mut config = ServiceConfig::default();
        config.queue.enabled = true;
        config.breakers.insert("payments".into(), Default::default());

        let services = build_services(&config).await.unwrap();
        assert!(services.dispatcher.queue("notifications").is_initialized());
        assert!(services.breakers.get("payments").is_some());
    }

    #[tokio::test]
    async fn test_unreachable_redis_store_is_fatal() {
        let mut config = ServiceConfig::default();
        config.store.backend = BackendKind::Redis;
        config.store.redis_url = "redis://127.0.0.1:1".into();
        config.timeouts.store_connect_secs = 1;

        let result = build_services(&config).await;
        assert!(matches!(result, Err(StartupError::Store(_))));
    }

    #[tokio::test]
    async fn test_unreachable_redis_queue_is_uninitialized() {
        let mut config = ServiceConfig::default();
        config.queue.enabled = true;
        config.queue.backend = BackendKind::Redis;
        config.queue.redis_url = "redis://127.0.0.1:1".into();
        config.timeouts.store_connect_secs = 1;

        let services = build_services(&config).await.unwrap();
        assert!(!services.dispatcher.queue("notifications").is_initialized());
    }
}
