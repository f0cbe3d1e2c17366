//! In-process queue producer that records what it was given.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::jobs::dispatcher::{EnqueueError, QueueProducer};
use crate::jobs::envelope::JobEnvelope;

/// Records every accepted job. Used in development and tests.
#[derive(Clone)]
pub struct MemoryQueue {
    jobs: Arc<Mutex<Vec<JobEnvelope>>>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Vec::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Make `add` fail (`false`) or succeed again (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Snapshot of accepted jobs in submission order.
    pub fn jobs(&self) -> Vec<JobEnvelope> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl QueueProducer for MemoryQueue {
    async fn add(&self, job: &JobEnvelope) -> Result<(), EnqueueError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(EnqueueError::Backend("memory queue is offline".into()));
        }
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(job.clone());
        Ok(())
    }
}
