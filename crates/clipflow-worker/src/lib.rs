//! Background job queue: bounded submission, semaphore-bounded worker
//! pool, retry with capped backoff, and a periodic orphan-recovery tick.
//! Dispatch goes through [`JobHandlerContext`] so the queue knows nothing
//! about media processing.

pub mod context;
pub mod queue;

pub use context::JobHandlerContext;
pub use queue::{JobQueue, QueueConfig};
