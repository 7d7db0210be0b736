//! The Cron Reconciler (spec.md §4.8): periodic sweep that resurrects
//! stalled workflows and POs with completed data but non-terminal status.
//!
//! Uses the Database Gateway's dedicated direct-endpoint pool so the
//! Reconciler never competes with queue workers for connections during
//! cold start (spec.md §4.1, §4.8).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use po_db::Gateway;
use po_queue::{EnqueueOptions, QueueRuntime};
use po_types::StageName;
use serde_json::json;
use sqlx::Row;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ReconcilerResult;
use crate::summary::ReconcilerSummary;

/// Liveness threshold (spec.md §3 invariant 1, §4.8).
const STALL_THRESHOLD: &str = "5 minutes";

pub struct Reconciler {
    gateway: Arc<Gateway>,
    queue: Arc<QueueRuntime>,
}

impl Reconciler {
    pub fn new(gateway: Arc<Gateway>, queue: Arc<QueueRuntime>) -> Self {
        Self { gateway, queue }
    }

    /// Spawns the periodic sweep loop. Waits `startup_delay` before the
    /// first run (spec.md §4.8 default 3s) so it doesn't compete with
    /// queue workers during cold start.
    pub fn spawn_loop(self: Arc<Self>, interval: Duration, startup_delay: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(startup_delay).await;
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let summary = self.run_once().await;
                summary.log();
            }
        });
    }

    /// Runs one sweep. Failures in an individual record never abort the
    /// sweep (spec.md §4.8 failure semantics) — they're counted and logged.
    pub async fn run_once(&self) -> ReconcilerSummary {
        let mut summary = ReconcilerSummary::default();

        let fixed_po_ids = match self.auto_fix_completed_pos(&mut summary).await {
            Ok(ids) => ids,
            Err(err) => {
                error!(%err, "auto-fix step failed");
                HashSet::new()
            }
        };

        if let Err(err) = self.requeue_stalled_workflows(&fixed_po_ids, &mut summary).await {
            error!(%err, "requeue step failed");
        }

        summary
    }

    /// Step 1: POs stuck in `processing` that already have line items get
    /// force-completed rather than re-run (spec.md §4.8 step 1).
    async fn auto_fix_completed_pos(&self, summary: &mut ReconcilerSummary) -> ReconcilerResult<HashSet<Uuid>> {
        let pool = self.gateway.direct_pool();
        let rows = sqlx::query(&format!(
            r#"
            SELECT id, confidence FROM purchase_orders
            WHERE status = 'processing'
              AND updated_at < now() - interval '{STALL_THRESHOLD}'
              AND EXISTS (SELECT 1 FROM po_line_items WHERE purchase_order_id = purchase_orders.id)
            "#
        ))
        .fetch_all(pool)
        .await?;

        let mut fixed = HashSet::new();
        for row in rows {
            let po_id: Uuid = row.get("id");
            let confidence: f64 = row.get("confidence");
            let status = if confidence >= po_types::CONFIDENCE_COMPLETE_THRESHOLD { "completed" } else { "review_needed" };

            let result = sqlx::query(
                "UPDATE purchase_orders SET status = $2, job_status = 'completed', updated_at = now() WHERE id = $1",
            )
            .bind(po_id)
            .bind(status)
            .execute(pool)
            .await;

            match result {
                Ok(_) => {
                    let _ = sqlx::query(
                        r#"
                        UPDATE workflow_executions
                        SET status = 'completed', current_stage = $2, completed_at = now(), updated_at = now()
                        WHERE purchase_order_id = $1 AND status NOT IN ('completed', 'failed')
                        "#,
                    )
                    .bind(po_id)
                    .bind(StageName::StatusUpdate.to_string())
                    .execute(pool)
                    .await;

                    info!(purchase_order_id = %po_id, status, "reconciler auto-fixed a stalled PO with completed data");
                    summary.auto_fixed += 1;
                    fixed.insert(po_id);
                }
                Err(err) => {
                    warn!(%err, purchase_order_id = %po_id, "failed to auto-fix PO");
                    summary.failed += 1;
                }
            }
        }
        Ok(fixed)
    }

    /// Step 2: workflows stuck in `processing` whose PO was *not* handled by
    /// step 1 are re-queued at their last active stage, deduplicated by PO
    /// id (spec.md §4.8 step 2).
    async fn requeue_stalled_workflows(&self, already_fixed: &HashSet<Uuid>, summary: &mut ReconcilerSummary) -> ReconcilerResult<()> {
        let pool = self.gateway.direct_pool();
        let rows = sqlx::query(&format!(
            r#"
            SELECT workflow_id, purchase_order_id, merchant_id, current_stage
            FROM workflow_executions
            WHERE status = 'processing' AND updated_at < now() - interval '{STALL_THRESHOLD}'
            ORDER BY purchase_order_id, updated_at ASC
            "#
        ))
        .fetch_all(pool)
        .await?;

        let mut seen_pos: HashSet<Uuid> = HashSet::new();
        for row in rows {
            let purchase_order_id: Uuid = row.get("purchase_order_id");
            if already_fixed.contains(&purchase_order_id) {
                summary.skipped += 1;
                continue;
            }
            if !seen_pos.insert(purchase_order_id) {
                // Already picked one workflow for this PO this sweep.
                summary.skipped += 1;
                continue;
            }

            let workflow_id: String = row.get("workflow_id");
            let merchant_id: Uuid = row.get("merchant_id");
            let current_stage: Option<String> = row.get("current_stage");
            let stage = current_stage
                .as_deref()
                .and_then(StageName::from_queue_name)
                .unwrap_or_else(StageName::first);

            match self
                .queue
                .enqueue(
                    stage.queue_name(),
                    json!({ "workflow_id": workflow_id, "purchase_order_id": purchase_order_id, "merchant_id": merchant_id }),
                    EnqueueOptions::default(),
                )
                .await
            {
                Ok(_) => {
                    info!(%workflow_id, %purchase_order_id, stage = %stage, "reconciler re-queued a stalled workflow");
                    summary.requeued += 1;
                }
                Err(err) => {
                    warn!(%err, %workflow_id, "failed to re-queue stalled workflow");
                    summary.failed += 1;
                }
            }
        }
        Ok(())
    }
}
