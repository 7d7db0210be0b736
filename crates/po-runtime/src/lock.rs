//! PO Lock Manager (spec.md §4.5): advisory lock keyed by PO id.
//!
//! Backed by a Postgres table rather than `pg_advisory_lock`: the Reconciler
//! needs to see lock state for diagnostics, and the lock must survive being
//! held across a poll loop under an explicit lease rather than a
//! session-scoped advisory lock that dies with the connection (SPEC_FULL.md
//! §4.5 design decision).

use std::time::Duration;

use po_db::Gateway;
use po_types::{PurchaseOrderId, WorkflowId};
use tracing::instrument;

use crate::error::{RuntimeError, RuntimeResult};

#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    pub lease: Duration,
    pub max_wait: Duration,
    pub poll_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(60),
            max_wait: Duration::from_secs(15),
            poll_interval: Duration::from_millis(300),
        }
    }
}

pub struct PoLockManager<'a> {
    gateway: &'a Gateway,
}

/// RAII guard: releases the lock when dropped in the common case, but
/// callers on the hot path should call `release` explicitly so the release
/// happens before progress publication (spec.md §4.5 rule).
pub struct LockGuard {
    pub purchase_order_id: PurchaseOrderId,
    pub workflow_id: WorkflowId,
    released: bool,
}

impl<'a> PoLockManager<'a> {
    pub fn new(gateway: &'a Gateway) -> Self {
        Self { gateway }
    }

    #[instrument(skip(self))]
    pub async fn acquire(
        &self,
        purchase_order_id: PurchaseOrderId,
        workflow_id: &WorkflowId,
        stage: &str,
        opts: LockOptions,
    ) -> RuntimeResult<LockGuard> {
        let deadline = tokio::time::Instant::now() + opts.max_wait;
        loop {
            let acquired = self.try_acquire_once(purchase_order_id, workflow_id, stage, opts.lease).await?;
            if acquired {
                return Ok(LockGuard {
                    purchase_order_id,
                    workflow_id: workflow_id.clone(),
                    released: false,
                });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(RuntimeError::LockWaitTimedOut(opts.max_wait));
            }
            tokio::time::sleep(opts.poll_interval).await;
        }
    }

    async fn try_acquire_once(
        &self,
        purchase_order_id: PurchaseOrderId,
        workflow_id: &WorkflowId,
        stage: &str,
        lease: Duration,
    ) -> RuntimeResult<bool> {
        let pool = self.gateway.client().await?;
        let rows = sqlx::query(
            r#"
            INSERT INTO po_locks (purchase_order_id, holder_workflow_id, stage, leased_until)
            VALUES ($1, $2, $3, now() + $4::interval)
            ON CONFLICT (purchase_order_id) DO UPDATE
                SET holder_workflow_id = excluded.holder_workflow_id,
                    stage = excluded.stage,
                    leased_until = excluded.leased_until
                WHERE po_locks.leased_until < now()
            RETURNING purchase_order_id
            "#,
        )
        .bind(purchase_order_id.as_uuid())
        .bind(workflow_id.as_ref())
        .bind(stage)
        .bind(format!("{} seconds", lease.as_secs_f64()))
        .fetch_optional(pool)
        .await?;

        Ok(rows.is_some())
    }

    #[instrument(skip(self, guard))]
    pub async fn release(&self, mut guard: LockGuard) -> RuntimeResult<()> {
        let pool = self.gateway.client().await?;
        let result = sqlx::query("DELETE FROM po_locks WHERE purchase_order_id = $1 AND holder_workflow_id = $2")
            .bind(guard.purchase_order_id.as_uuid())
            .bind(guard.workflow_id.as_ref())
            .execute(pool)
            .await?;
        guard.released = true;
        if result.rows_affected() == 0 {
            return Err(RuntimeError::LockNotHeld);
        }
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(
                purchase_order_id = %self.purchase_order_id,
                workflow_id = %self.workflow_id,
                "PO lock guard dropped without explicit release"
            );
        }
    }
}
