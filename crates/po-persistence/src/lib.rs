//! The Persistence Service (spec.md §4.9): the transactional writer invoked
//! by the `database_save` stage, plus PO Number Conflict Resolution
//! (spec.md §4.7).

pub mod conflict;
pub mod error;
pub mod sku;
pub mod supplier;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use writer::{DatabaseSaveInput, PersistOutcome, PersistenceService};
