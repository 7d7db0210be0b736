use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Database(#[from] po_db::GatewayError),
    #[error(transparent)]
    Query(#[from] sqlx::Error),
    #[error("line item verification failed: expected {expected} rows, found {found}")]
    LineItemCountMismatch { expected: usize, found: i64 },
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
