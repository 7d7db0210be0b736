//! The Cron Reconciler (spec.md §4.8).

pub mod error;
pub mod reconciler;
pub mod summary;

pub use error::{ReconcilerError, ReconcilerResult};
pub use reconciler::Reconciler;
pub use summary::ReconcilerSummary;
