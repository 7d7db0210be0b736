use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("workflow {0} not found")]
    WorkflowNotFound(po_types::WorkflowId),
    #[error(transparent)]
    Database(#[from] po_db::GatewayError),
    #[error(transparent)]
    Runtime(#[from] po_runtime::RuntimeError),
    #[error(transparent)]
    Queue(#[from] po_queue::QueueError),
    #[error(transparent)]
    Query(#[from] sqlx::Error),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
