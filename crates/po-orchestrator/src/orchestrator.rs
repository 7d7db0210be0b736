//! The Workflow Orchestrator (spec.md §4.6): the stage state machine.
//!
//! `run_stage` is the generic "around" logic every stage shares (load
//! accumulator, lock if mutating, invoke the stage's work, persist +
//! advance, release lock, publish progress, enqueue next) — grounded on the
//! five-step loop spec.md §4.6 describes. The stage-specific collaborator
//! call (AI parse, Shopify sync, the persistence write, ...) is supplied by
//! the caller as `work`, since those collaborators live in other crates
//! (`po-persistence`, or trait objects in `po_types::capabilities`) that
//! this crate intentionally does not depend on.

use std::future::Future;
use std::sync::Arc;

use po_db::Gateway;
use po_queue::{EnqueueOptions, QueueRuntime};
use po_runtime::{LockOptions, PoLockManager, ProgressChannel, RedisProgressPublisher, StageResultStore};
use po_types::{MerchantId, PurchaseOrderId, StageName, WorkflowExecution, WorkflowId};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::error::OrchestratorResult;
use crate::store::WorkflowStore;

pub struct Orchestrator {
    store: WorkflowStore,
    gateway: Arc<Gateway>,
    stage_store: Arc<dyn StageResultStore>,
    progress: Arc<RedisProgressPublisher>,
    queue: Arc<QueueRuntime>,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<Gateway>,
        stage_store: Arc<dyn StageResultStore>,
        progress: Arc<RedisProgressPublisher>,
        queue: Arc<QueueRuntime>,
    ) -> Self {
        Self { store: WorkflowStore::new(gateway.clone()), gateway, stage_store, progress, queue }
    }

    /// `StartWorkflow(input)` (spec.md §4.6).
    #[instrument(skip(self))]
    pub async fn start_workflow(
        &self,
        purchase_order_id: PurchaseOrderId,
        merchant_id: MerchantId,
    ) -> OrchestratorResult<WorkflowExecution> {
        let exec = WorkflowExecution::new(purchase_order_id, merchant_id);
        self.store.create(&exec).await?;

        let first = StageName::first();
        self.queue
            .enqueue(
                first.queue_name(),
                json!({ "workflow_id": exec.workflow_id, "purchase_order_id": purchase_order_id, "merchant_id": merchant_id }),
                EnqueueOptions::default(),
            )
            .await?;
        info!(workflow_id = %exec.workflow_id, %purchase_order_id, "workflow started");
        Ok(exec)
    }

    /// Runs one stage's work under the orchestrator's standard plumbing.
    /// `work` receives the accumulated data and returns either the new
    /// accumulator fragment to merge in, or an error message for
    /// `fail_workflow`.
    #[instrument(skip(self, work))]
    pub async fn run_stage<F, Fut>(&self, workflow_id: &WorkflowId, stage: StageName, work: F) -> OrchestratorResult<()>
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<Value, String>>,
    {
        let exec = self.store.load(workflow_id).await?;
        let accumulated = self.stage_store.get_accumulated_data(workflow_id).await?;

        let lock_guard = if stage.mutates_po() {
            let manager = PoLockManager::new(&self.gateway);
            Some(
                manager
                    .acquire(exec.purchase_order_id, workflow_id, stage.queue_name(), LockOptions::default())
                    .await?,
            )
        } else {
            None
        };

        let result = work(accumulated).await;

        if let Some(guard) = lock_guard {
            let manager = PoLockManager::new(&self.gateway);
            if let Err(err) = manager.release(guard).await {
                warn!(%err, workflow_id = %workflow_id, "failed to release PO lock");
            }
        }

        match result {
            Ok(output) => self.advance_past(workflow_id, &exec, stage, output).await,
            Err(message) => self.fail_workflow(workflow_id, &exec, stage, &message).await,
        }
    }

    async fn advance_past(
        &self,
        workflow_id: &WorkflowId,
        exec: &WorkflowExecution,
        stage: StageName,
        output: Value,
    ) -> OrchestratorResult<()> {
        self.stage_store.save_stage_result(workflow_id, stage, output).await?;

        let stages_completed = (stage.index() + 1) as u32;
        let progress_percent = stage.progress_percent_after();
        self.store.advance(workflow_id, stage, progress_percent, stages_completed).await?;

        // Progress publication happens after the lock has been released and
        // outside any transaction (spec.md §4.5 rule).
        self.progress
            .publish_to(
                exec.merchant_id,
                ProgressChannel::Stage,
                &json!({ "workflowId": workflow_id, "stage": stage, "progressPercent": progress_percent }),
            )
            .await;

        match stage.next() {
            Some(next_stage) => {
                self.queue
                    .enqueue(
                        next_stage.queue_name(),
                        json!({ "workflow_id": workflow_id, "purchase_order_id": exec.purchase_order_id, "merchant_id": exec.merchant_id }),
                        EnqueueOptions::default(),
                    )
                    .await?;
            }
            None => {
                self.store.complete(workflow_id).await?;
                self.progress
                    .publish_to(exec.merchant_id, ProgressChannel::Completion, &json!({ "workflowId": workflow_id }))
                    .await;
            }
        }
        Ok(())
    }

    /// `failWorkflow(stage, error)` (spec.md §4.6): marks the workflow and
    /// its PO failed, and publishes an error event.
    #[instrument(skip(self, exec))]
    pub async fn fail_workflow(
        &self,
        workflow_id: &WorkflowId,
        exec: &WorkflowExecution,
        stage: StageName,
        error_message: &str,
    ) -> OrchestratorResult<()> {
        self.store.fail(workflow_id, stage, error_message).await?;

        let purchase_order_id = exec.purchase_order_id;
        let message = error_message.to_string();
        self.gateway
            .run_retryable(move |pool| {
                let message = message.clone();
                async move {
                    sqlx::query(
                        "UPDATE purchase_orders SET status = 'failed', job_status = 'failed', job_error = $2, updated_at = now() WHERE id = $1",
                    )
                    .bind(purchase_order_id.as_uuid())
                    .bind(message)
                    .execute(&pool)
                    .await?;
                    Ok(())
                }
            })
            .await?;

        self.progress
            .publish_to(
                exec.merchant_id,
                ProgressChannel::Error,
                &json!({ "workflowId": workflow_id, "stage": stage, "error": error_message }),
            )
            .await;
        Ok(())
    }
}
