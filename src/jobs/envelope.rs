//! Job envelopes handed to the queue.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form job payload.
pub type JobPayload = serde_json::Value;

/// Per-job delivery hints. Interpretation is up to the queue consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Hold the job back for this long before it becomes ready.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "millis")]
    pub delay: Option<Duration>,

    /// Maximum delivery attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

impl JobOptions {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }
}

/// A job as submitted to a queue. Ownership passes to the queue once accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: Uuid,
    pub queue_name: String,
    pub job_name: String,
    pub payload: JobPayload,
    #[serde(default)]
    pub options: JobOptions,
}

impl JobEnvelope {
    pub fn new(
        queue_name: impl Into<String>,
        job_name: impl Into<String>,
        payload: JobPayload,
        options: JobOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            queue_name: queue_name.into(),
            job_name: job_name.into(),
            payload,
            options,
        }
    }

    /// True when the job may be consumed immediately.
    pub fn is_ready(&self) -> bool {
        self.options.delay.map_or(true, |d| d.is_zero())
    }
}

/// Durations travel as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_u64(d.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
