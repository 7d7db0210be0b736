//! The Queue Runtime (spec.md §4.2): Redis-backed named queues.

pub mod error;
pub mod job;
pub mod names;
pub mod poller;
pub mod runtime;

pub use error::{QueueError, QueueResult};
pub use job::{EnqueueOptions, Job, JobId};
pub use names::{default_concurrency, is_known_queue, QUEUE_NAMES};
pub use runtime::{Handler, HandlerFuture, QueueRuntime};
