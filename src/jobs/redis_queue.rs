//! Redis-backed queue producer.
//!
//! # Key Layout
//! ```text
//! {prefix}:{queue}:job:{id}   job envelope (JSON), kept for the retention period
//! {prefix}:{queue}:wait       list of ready job ids (LPUSH, consumers pop the tail)
//! {prefix}:{queue}:delayed    sorted set of delayed job ids, scored by due time (ms)
//! ```
//!
//! Consumers are external; this side only writes.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

use crate::jobs::dispatcher::{EnqueueError, QueueProducer};
use crate::jobs::envelope::JobEnvelope;

/// How long job bodies stay readable by consumers.
const JOB_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
pub struct RedisQueue {
    connection: ConnectionManager,
    prefix: String,
}

impl RedisQueue {
    /// Connect to Redis, giving up after `connect_timeout`.
    pub async fn connect(
        url: &str,
        prefix: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, EnqueueError> {
        let client = Client::open(url)?;
        let connection = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                EnqueueError::Backend(format!("connect timed out after {connect_timeout:?}"))
            })??;

        Ok(Self {
            connection,
            prefix: prefix.into(),
        })
    }

    fn key(&self, queue: &str, suffix: &str) -> String {
        queue_key(&self.prefix, queue, suffix)
    }
}

fn queue_key(prefix: &str, queue: &str, suffix: &str) -> String {
    format!("{prefix}:{queue}:{suffix}")
}

fn due_at_millis(delay: Duration) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now + delay).as_millis() as u64
}

#[async_trait]
impl QueueProducer for RedisQueue {
    async fn add(&self, job: &JobEnvelope) -> Result<(), EnqueueError> {
        let mut conn = self.connection.clone();
        let id = job.id.to_string();
        let body = serde_json::to_string(job)?;

        let job_key = self.key(&job.queue_name, &format!("job:{id}"));
        let _: () = conn
            .set_ex(&job_key, body, JOB_RETENTION.as_secs())
            .await?;

        match job.options.delay.filter(|d| !d.is_zero()) {
            None => {
                let _: () = conn.lpush(self.key(&job.queue_name, "wait"), &id).await?;
            }
            Some(delay) => {
                let _: () = conn
                    .zadd(self.key(&job.queue_name, "delayed"), &id, due_at_millis(delay))
                    .await?;
            }
        }
        Ok(())
    }
}
