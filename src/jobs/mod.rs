//! Background job production.
//!
//! # Data Flow
//! ```text
//! handler
//!     → AsyncJobDispatcher::enqueue(queue, job, payload, options)
//!     → QueueProducer::add (memory or redis)
//!     → external queue (consumers run elsewhere)
//! ```

pub mod dispatcher;
pub mod envelope;
pub mod memory;
pub mod redis_queue;

pub use dispatcher::{AsyncJobDispatcher, DispatchOutcome, EnqueueError, QueueProducer, QueueRef};
pub use envelope::{JobEnvelope, JobOptions, JobPayload};
pub use memory::MemoryQueue;
pub use redis_queue::RedisQueue;
