//! Warmup protocol (spec.md §4.1).
//!
//! `Client()`/`Transaction()` must block until a `SELECT 1` probe has
//! succeeded at least once, and re-probe whenever the gateway suspects a
//! zombie connection (four consecutive engine errors).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::GatewayError;

/// Consecutive engine-error count past which `run_retryable` forces a
/// re-probe before its next attempt (spec.md §4.1 "reconnecting only after 4
/// consecutive engine-error retries").
pub const RECONNECT_AFTER_CONSECUTIVE_ERRORS: u32 = 4;

pub struct WarmupState {
    complete: AtomicBool,
    notify: Notify,
    consecutive_engine_errors: AtomicU32,
    ceiling: Duration,
}

impl WarmupState {
    pub fn new(ceiling: Duration) -> Self {
        Self {
            complete: AtomicBool::new(false),
            notify: Notify::new(),
            consecutive_engine_errors: AtomicU32::new(0),
            ceiling,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    fn mark_incomplete(&self) {
        self.complete.store(false, Ordering::Release);
    }

    /// Runs the `SELECT 1` probe and flips the warmup flag on success. Call
    /// once at startup and again whenever `note_engine_error` trips the
    /// reconnect threshold.
    pub async fn probe(&self, pool: &PgPool) -> Result<(), GatewayError> {
        let started = Instant::now();
        match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => {
                self.mark_complete();
                self.consecutive_engine_errors.store(0, Ordering::Release);
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "database warmup probe succeeded");
                Ok(())
            }
            Err(err) => {
                self.mark_incomplete();
                warn!(error = %err, "database warmup probe failed");
                Err(GatewayError::Query(err))
            }
        }
    }

    /// Blocks the caller until warmup has completed, or returns an error
    /// once the hard ceiling elapses (spec.md §4.1: target ~2.5s, ceiling
    /// 10s).
    pub async fn wait(&self) -> Result<(), GatewayError> {
        if self.is_complete() {
            return Ok(());
        }
        tokio::time::timeout(self.ceiling, self.notify.notified())
            .await
            .map_err(|_| GatewayError::WarmupTimedOut(self.ceiling))?;
        Ok(())
    }

    /// Records an engine-class failure from `run_retryable`; returns `true`
    /// once the reconnect threshold is reached (the caller should then
    /// re-probe before its next attempt — zombie-connection defense).
    pub fn note_engine_error(&self) -> bool {
        let count = self.consecutive_engine_errors.fetch_add(1, Ordering::AcqRel) + 1;
        if count >= RECONNECT_AFTER_CONSECUTIVE_ERRORS {
            self.mark_incomplete();
            true
        } else {
            false
        }
    }

    pub fn note_success(&self) {
        self.consecutive_engine_errors.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_incomplete() {
        let state = WarmupState::new(Duration::from_secs(10));
        assert!(!state.is_complete());
    }

    #[test]
    fn reconnect_threshold_trips_after_four_errors() {
        let state = WarmupState::new(Duration::from_secs(10));
        for _ in 0..3 {
            assert!(!state.note_engine_error());
        }
        assert!(state.note_engine_error());
    }

    #[test]
    fn success_resets_the_error_counter() {
        let state = WarmupState::new(Duration::from_secs(10));
        state.note_engine_error();
        state.note_engine_error();
        state.note_success();
        assert!(!state.note_engine_error());
        assert!(!state.note_engine_error());
        assert!(state.note_engine_error());
    }

    #[tokio::test]
    async fn wait_times_out_if_never_marked_complete() {
        let state = WarmupState::new(Duration::from_millis(20));
        let err = state.wait().await.unwrap_err();
        assert!(matches!(err, GatewayError::WarmupTimedOut(_)));
    }
}
