//! Fire-and-forget job submission.
//!
//! # Design Decisions
//! - `enqueue` returns once the queue has accepted the job, not once it ran
//! - Ordering, retries and backoff belong to the queue and its consumers
//! - Enqueue failures are logged and swallowed; callers get a
//!   [`DispatchOutcome`] they may inspect but never an error
//! - A queue that was never initialized (disabled in config, failed to connect)
//!   is a silent no-op apart from a warning

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::jobs::envelope::{JobEnvelope, JobOptions};
use crate::observability::metrics;

/// Errors from a queue producer. Never surfaced to request handlers.
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("queue backend error: {0}")]
    Backend(String),

    #[error("job payload could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for EnqueueError {
    fn from(err: redis::RedisError) -> Self {
        EnqueueError::Backend(err.to_string())
    }
}

/// Producer side of an external durable queue.
#[async_trait]
pub trait QueueProducer: Send + Sync {
    /// Hand a job to the queue. Returns once the queue has accepted it.
    async fn add(&self, job: &JobEnvelope) -> Result<(), EnqueueError>;
}

/// Handle to a named queue, possibly without a live producer behind it.
#[derive(Clone)]
pub struct QueueRef {
    name: String,
    producer: Option<Arc<dyn QueueProducer>>,
}

impl QueueRef {
    pub fn new(name: impl Into<String>, producer: Arc<dyn QueueProducer>) -> Self {
        Self {
            name: name.into(),
            producer: Some(producer),
        }
    }

    pub fn uninitialized(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            producer: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_initialized(&self) -> bool {
        self.producer.is_some()
    }
}

impl std::fmt::Debug for QueueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueRef")
            .field("name", &self.name)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// What happened to an enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The queue accepted the job.
    Accepted,
    /// The queue reference had no producer; nothing was sent.
    Skipped,
    /// The job could not be encoded or the queue refused it.
    Rejected,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Accepted => "accepted",
            DispatchOutcome::Skipped => "skipped",
            DispatchOutcome::Rejected => "rejected",
        }
    }
}

/// Thin producer over the configured queues.
#[derive(Debug, Clone, Default)]
pub struct AsyncJobDispatcher {
    queues: BTreeMap<String, QueueRef>,
}

impl AsyncJobDispatcher {
    pub fn new(queues: impl IntoIterator<Item = QueueRef>) -> Self {
        Self {
            queues: queues
                .into_iter()
                .map(|q| (q.name().to_string(), q))
                .collect(),
        }
    }

    /// Look up a queue by name. Unknown names yield an uninitialized handle.
    pub fn queue(&self, name: &str) -> QueueRef {
        self.queues
            .get(name)
            .cloned()
            .unwrap_or_else(|| QueueRef::uninitialized(name))
    }

    /// Every known queue, ordered by name.
    pub fn queues(&self) -> impl Iterator<Item = &QueueRef> {
        self.queues.values()
    }

    /// Submit a job without blocking the caller on its execution.
    pub async fn enqueue<P: Serialize + ?Sized>(
        &self,
        queue: &QueueRef,
        job_name: &str,
        payload: &P,
        options: Option<JobOptions>,
    ) -> DispatchOutcome {
        let outcome = Self::submit(queue, job_name, payload, options).await;
        metrics::record_enqueue(queue.name(), outcome.as_str());
        outcome
    }

    async fn submit<P: Serialize + ?Sized>(
        queue: &QueueRef,
        job_name: &str,
        payload: &P,
        options: Option<JobOptions>,
    ) -> DispatchOutcome {
        let Some(producer) = &queue.producer else {
            tracing::warn!(queue = %queue.name(), job = %job_name, "Queue not initialized, dropping job");
            return DispatchOutcome::Skipped;
        };

        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                let error = EnqueueError::from(e);
                tracing::error!(queue = %queue.name(), job = %job_name, error = %error, "Failed to enqueue job");
                return DispatchOutcome::Rejected;
            }
        };

        let envelope = JobEnvelope::new(queue.name(), job_name, payload, options.unwrap_or_default());
        match producer.add(&envelope).await {
            Ok(()) => {
                tracing::debug!(queue = %queue.name(), job = %job_name, job_id = %envelope.id, "Job enqueued");
                DispatchOutcome::Accepted
            }
            Err(e) => {
                tracing::error!(queue = %queue.name(), job = %job_name, error = %e, "Failed to enqueue job");
                DispatchOutcome::Rejected
            }
        }
    }
}
