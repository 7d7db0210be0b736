use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Query(#[from] sqlx::Error),
    #[error(transparent)]
    Queue(#[from] po_queue::QueueError),
}

pub type ReconcilerResult<T> = Result<T, ReconcilerError>;
