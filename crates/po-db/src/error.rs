//! Error taxonomy for the Database Gateway (spec.md §4.1, §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("database engine not connected")]
    EngineNotConnected,
    #[error("database engine returned an empty response")]
    EngineEmptyResponse,
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },
    #[error("lock wait timed out")]
    LockTimeout,
    #[error("statement exceeded its timeout")]
    StatementTimeout,
    #[error("warmup did not complete within {0:?}")]
    WarmupTimedOut(std::time::Duration),
    #[error("transaction exceeded its {0:?} timeout")]
    TransactionTimeout(std::time::Duration),
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Query(#[from] sqlx::Error),
}

/// Classification of an underlying `sqlx::Error`, the Rust equivalent of the
/// distilled spec's JS error-name switch (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    EngineNotConnected,
    EngineEmptyResponse,
    UniqueViolation,
    LockTimeout,
    StatementTimeout,
    Other,
}

impl DbErrorKind {
    /// Whether the Database Gateway's retry wrapper should retry an error of
    /// this kind (spec.md §4.1: `ENGINE_NOT_CONNECTED` retryable,
    /// `ENGINE_EMPTY_RESPONSE` retryable once, `STATEMENT_TIMEOUT` fatal).
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbErrorKind::EngineNotConnected | DbErrorKind::EngineEmptyResponse)
    }
}

pub fn classify(err: &sqlx::Error) -> DbErrorKind {
    match err {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => DbErrorKind::EngineNotConnected,
        sqlx::Error::RowNotFound => DbErrorKind::EngineEmptyResponse,
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            // Postgres SQLSTATE codes.
            Some("23505") => DbErrorKind::UniqueViolation,
            Some("55P03") => DbErrorKind::LockTimeout,
            Some("57014") => DbErrorKind::StatementTimeout,
            _ => DbErrorKind::Other,
        },
        sqlx::Error::Io(_) => DbErrorKind::EngineNotConnected,
        _ => DbErrorKind::Other,
    }
}
