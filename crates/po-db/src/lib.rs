//! The Database Gateway (spec.md §4.1): warmup gating, bounded retries, and
//! a transaction guard around a pair of Postgres pools.

pub mod error;
pub mod gateway;
pub mod retry;
pub mod warmup;

pub use error::{classify, DbErrorKind, GatewayError};
pub use gateway::{Gateway, TransactionOptions};
pub use retry::RetryPolicy;
