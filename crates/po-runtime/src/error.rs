use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error(transparent)]
    Database(#[from] po_db::GatewayError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("PO lock wait timed out after {0:?}")]
    LockWaitTimedOut(std::time::Duration),
    #[error("cannot release a lock this workflow does not hold")]
    LockNotHeld,
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
