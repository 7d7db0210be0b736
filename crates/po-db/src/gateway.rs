//! The Database Gateway (spec.md §4.1): one process-wide handle providing
//! warmup gating, bounded retries, and transaction scoping.
//!
//! Grounded on the teacher's `everruns_durable::persistence::postgres`
//! module, which wraps a `PgPool` behind a narrow set of methods rather than
//! exposing the pool directly to callers — generalized here from a
//! workflow-event-store-specific API to the generic `run_retryable` /
//! `transaction` contract spec.md asks for.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use tracing::{instrument, warn};

use po_types::Settings;

use crate::error::{classify, DbErrorKind, GatewayError};
use crate::retry::RetryPolicy;
use crate::warmup::WarmupState;

/// Transaction options (spec.md §4.1: `opts.timeout` defaults to 15s,
/// retries inside a transaction are disabled).
#[derive(Debug, Clone, Copy)]
pub struct TransactionOptions {
    pub timeout: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(15) }
    }
}

pub struct Gateway {
    runtime_pool: PgPool,
    direct_pool: PgPool,
    warmup: WarmupState,
    retry_policy: RetryPolicy,
    connection_max_age: Duration,
    pool_created_at: tokio::time::Instant,
    pool_cycles: AtomicU32,
}

impl Gateway {
    /// Builds both pools and runs the initial warmup probe. Does not block
    /// on warmup completing beyond the settings' warmup window — callers
    /// that need a ready handle should call `client()` afterward, which
    /// waits up to the hard ceiling.
    #[instrument(skip(settings))]
    pub async fn connect(settings: &Settings) -> Result<Self, GatewayError> {
        let runtime_pool = PgPoolOptions::new()
            .max_connections(settings.connection_pool_size)
            .max_lifetime(settings.connection_max_age)
            .connect(&settings.database_url)
            .await?;

        // Separate pool so the Reconciler never competes with queue
        // processors for connections during warmup (spec.md §4.1).
        let direct_pool = PgPoolOptions::new()
            .max_connections(2)
            .max_lifetime(settings.connection_max_age)
            .connect(&settings.database_direct_url)
            .await?;

        let gateway = Self {
            runtime_pool,
            direct_pool,
            warmup: WarmupState::new(settings.db_warmup_ceiling),
            retry_policy: RetryPolicy::gateway_default(),
            connection_max_age: settings.connection_max_age,
            pool_created_at: tokio::time::Instant::now(),
            pool_cycles: AtomicU32::new(0),
        };

        // db_warmup_window is a target, not a cutoff (spec.md §4.1): if the
        // probe hasn't finished by then, keep it running toward the hard
        // ceiling instead of cancelling it and leaving warmup stuck
        // incomplete with nothing left to re-probe.
        if tokio::time::timeout(settings.db_warmup_window, gateway.warmup.probe(&gateway.runtime_pool)).await.is_err() {
            warn!("database warmup probe exceeded the target window, continuing toward the ceiling");
            let remaining = settings.db_warmup_ceiling.saturating_sub(settings.db_warmup_window);
            let _ = tokio::time::timeout(remaining, gateway.warmup.probe(&gateway.runtime_pool)).await;
        }
        Ok(gateway)
    }

    #[cfg(test)]
    pub(crate) fn for_test(runtime_pool: PgPool, direct_pool: PgPool) -> Self {
        Self {
            runtime_pool,
            direct_pool,
            warmup: WarmupState::new(Duration::from_secs(10)),
            retry_policy: RetryPolicy::gateway_default(),
            connection_max_age: Duration::from_secs(300),
            pool_created_at: tokio::time::Instant::now(),
            pool_cycles: AtomicU32::new(0),
        }
    }

    /// `Client()`: blocks until warmup has completed, then returns the
    /// pooled runtime handle. A stale pool (past `connection_max_age`)
    /// forces a re-probe before being handed out — the zombie-connection
    /// defense.
    #[instrument(skip(self))]
    pub async fn client(&self) -> Result<&PgPool, GatewayError> {
        if self.pool_created_at.elapsed() > self.connection_max_age && self.warmup.is_complete() {
            self.pool_cycles.fetch_add(1, Ordering::Relaxed);
            self.warmup.probe(&self.runtime_pool).await?;
        }
        self.warmup.wait().await?;
        Ok(&self.runtime_pool)
    }

    /// The Reconciler's dedicated direct-endpoint pool (spec.md §4.1, §4.8).
    pub fn direct_pool(&self) -> &PgPool {
        &self.direct_pool
    }

    /// `RunRetryable(op)`: executes `op` up to 5 times with exponential
    /// backoff, reconnecting (re-probing) after 4 consecutive engine-class
    /// errors, never mid-warmup.
    #[instrument(skip(self, op))]
    pub async fn run_retryable<T, F, Fut>(&self, mut op: F) -> Result<T, GatewayError>
    where
        F: FnMut(PgPool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        self.warmup.wait().await?;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op(self.runtime_pool.clone()).await {
                Ok(value) => {
                    self.warmup.note_success();
                    return Ok(value);
                }
                Err(err) => {
                    let kind = classify(&err);
                    if kind.is_retryable() && self.retry_policy.has_attempts_remaining(attempt) {
                        if self.warmup.note_engine_error() {
                            warn!("reconnecting after consecutive engine errors");
                            self.warmup.probe(&self.runtime_pool).await.ok();
                        }
                        tokio::time::sleep(self.retry_policy.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(map_terminal_error(kind, err, attempt));
                }
            }
        }
    }

    /// `Transaction(fn, opts)`: the transaction guard — begins only after
    /// warmup, disables retries inside the transaction body, and enforces
    /// `opts.timeout`.
    #[instrument(skip(self, body, opts))]
    pub async fn transaction<T, F>(&self, opts: TransactionOptions, body: F) -> Result<T, GatewayError>
    where
        F: for<'t> FnOnce(
            &'t mut SqlxTransaction<'static, Postgres>,
        ) -> Pin<Box<dyn Future<Output = Result<T, sqlx::Error>> + Send + 't>>,
    {
        // No retry policy is applied inside a transaction (spec.md §4.1):
        // the body runs once and either commits or rolls back.
        self.warmup.wait().await?;

        let fut = async {
            let mut tx = self.runtime_pool.begin().await?;
            match body(&mut tx).await {
                Ok(value) => {
                    tx.commit().await?;
                    Ok(value)
                }
                Err(err) => {
                    // Rollback is best-effort: the transaction is dropped
                    // regardless, which rolls back on the server side too.
                    let _ = tx.rollback().await;
                    Err(err)
                }
            }
        };

        match tokio::time::timeout(opts.timeout, fut).await {
            Ok(result) => result.map_err(GatewayError::Query),
            Err(_) => Err(GatewayError::TransactionTimeout(opts.timeout)),
        }
    }
}

fn map_terminal_error(kind: DbErrorKind, err: sqlx::Error, attempts: u32) -> GatewayError {
    match kind {
        DbErrorKind::LockTimeout => GatewayError::LockTimeout,
        DbErrorKind::StatementTimeout => GatewayError::StatementTimeout,
        DbErrorKind::UniqueViolation => {
            let constraint = match &err {
                sqlx::Error::Database(db_err) => db_err.constraint().unwrap_or("unknown").to_string(),
                _ => "unknown".to_string(),
            };
            GatewayError::UniqueViolation { constraint }
        }
        DbErrorKind::EngineNotConnected | DbErrorKind::EngineEmptyResponse if attempts > 1 => {
            GatewayError::RetriesExhausted { attempts, source: err }
        }
        _ => GatewayError::Query(err),
    }
}
