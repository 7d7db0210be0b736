//! Stage Result Store, Progress Bus, and PO Lock Manager (spec.md §4.3-4.5).

pub mod error;
pub mod lock;
pub mod progress;
pub mod stage_store;

pub use error::{RuntimeError, RuntimeResult};
pub use lock::{LockGuard, LockOptions, PoLockManager};
pub use progress::{channel_name, ProgressChannel, RedisProgressPublisher};
pub use stage_store::{InMemoryStageResultStore, RedisStageResultStore, StageResultStore};
