//! `WorkflowExecution` persistence (spec.md §3, §4.6).
//!
//! Grounded on the teacher's `PostgresWorkflowEventStore::{create_workflow,
//! update_workflow_status}` shape, simplified to a flat row rather than an
//! event log: the stage DAG here is fixed and linear, so event sourcing's
//! value (replaying an arbitrary action log) doesn't apply (SPEC_FULL.md
//! §4.6 design decision).

use std::collections::HashMap;
use std::sync::Arc;

use po_db::Gateway;
use po_types::{MerchantId, PurchaseOrderId, StageName, WorkflowExecution, WorkflowId, WorkflowStatus};
use sqlx::Row;
use tracing::instrument;

use crate::error::{OrchestratorError, OrchestratorResult};

pub struct WorkflowStore {
    gateway: Arc<Gateway>,
}

impl WorkflowStore {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    #[instrument(skip(self))]
    pub async fn create(&self, exec: &WorkflowExecution) -> OrchestratorResult<()> {
        let workflow_id = exec.workflow_id.clone();
        let purchase_order_id = exec.purchase_order_id;
        let merchant_id = exec.merchant_id;
        self.gateway
            .run_retryable(move |pool| {
                let workflow_id = workflow_id.clone();
                async move {
                    sqlx::query(
                        r#"
                        INSERT INTO workflow_executions
                            (workflow_id, purchase_order_id, merchant_id, status, progress_percent,
                             stages_completed, created_at, updated_at)
                        VALUES ($1, $2, $3, 'pending', 0, 0, now(), now())
                        "#,
                    )
                    .bind(workflow_id.as_ref())
                    .bind(purchase_order_id.as_uuid())
                    .bind(merchant_id.as_uuid())
                    .execute(&pool)
                    .await?;
                    Ok(())
                }
            })
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn load(&self, workflow_id: &WorkflowId) -> OrchestratorResult<WorkflowExecution> {
        let id = workflow_id.clone();
        let row = self
            .gateway
            .run_retryable(move |pool| {
                let id = id.clone();
                async move {
                    sqlx::query(
                        r#"
                        SELECT workflow_id, purchase_order_id, merchant_id, status, current_stage,
                               failed_stage, progress_percent, stages_completed, stage_errors,
                               error_message, created_at, updated_at, completed_at
                        FROM workflow_executions WHERE workflow_id = $1
                        "#,
                    )
                    .bind(id.as_ref())
                    .fetch_optional(&pool)
                    .await
                }
            })
            .await?;

        let row = row.ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.clone()))?;
        Ok(row_to_execution(row))
    }

    #[instrument(skip(self))]
    pub async fn advance(
        &self,
        workflow_id: &WorkflowId,
        stage: StageName,
        progress_percent: u8,
        stages_completed: u32,
    ) -> OrchestratorResult<()> {
        let id = workflow_id.clone();
        let stage_name = stage.to_string();
        self.gateway
            .run_retryable(move |pool| {
                let id = id.clone();
                let stage_name = stage_name.clone();
                async move {
                    sqlx::query(
                        r#"
                        UPDATE workflow_executions
                        SET status = 'processing', current_stage = $2, progress_percent = $3,
                            stages_completed = $4, updated_at = now()
                        WHERE workflow_id = $1
                        "#,
                    )
                    .bind(id.as_ref())
                    .bind(stage_name)
                    .bind(progress_percent as i32)
                    .bind(stages_completed as i32)
                    .execute(&pool)
                    .await?;
                    Ok(())
                }
            })
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn complete(&self, workflow_id: &WorkflowId) -> OrchestratorResult<()> {
        let id = workflow_id.clone();
        self.gateway
            .run_retryable(move |pool| {
                let id = id.clone();
                async move {
                    sqlx::query(
                        r#"
                        UPDATE workflow_executions
                        SET status = 'completed', progress_percent = 100, completed_at = now(), updated_at = now()
                        WHERE workflow_id = $1
                        "#,
                    )
                    .bind(id.as_ref())
                    .execute(&pool)
                    .await?;
                    Ok(())
                }
            })
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn fail(&self, workflow_id: &WorkflowId, stage: StageName, error_message: &str) -> OrchestratorResult<()> {
        let id = workflow_id.clone();
        let stage_name = stage.to_string();
        let message = error_message.to_string();
        self.gateway
            .run_retryable(move |pool| {
                let id = id.clone();
                let stage_name = stage_name.clone();
                let message = message.clone();
                async move {
                    sqlx::query(
                        r#"
                        UPDATE workflow_executions
                        SET status = 'failed', failed_stage = $2, error_message = $3,
                            stage_errors = coalesce(stage_errors, '{}'::jsonb)
                                || jsonb_build_object($2::text, $3::text),
                            updated_at = now()
                        WHERE workflow_id = $1
                        "#,
                    )
                    .bind(id.as_ref())
                    .bind(stage_name)
                    .bind(message)
                    .execute(&pool)
                    .await?;
                    Ok(())
                }
            })
            .await?;
        Ok(())
    }
}

fn row_to_execution(row: sqlx::postgres::PgRow) -> WorkflowExecution {
    let status: String = row.get("status");
    let current_stage: Option<String> = row.get("current_stage");
    let failed_stage: Option<String> = row.get("failed_stage");
    let stage_errors: Option<serde_json::Value> = row.get("stage_errors");
    let stage_errors = stage_errors
        .and_then(|v| serde_json::from_value::<HashMap<String, String>>(v).ok())
        .unwrap_or_default();

    WorkflowExecution {
        workflow_id: WorkflowId(row.get::<String, _>("workflow_id")),
        purchase_order_id: PurchaseOrderId::from_uuid(row.get("purchase_order_id")),
        merchant_id: MerchantId::from_uuid(row.get("merchant_id")),
        status: parse_status(&status),
        current_stage: current_stage.as_deref().and_then(StageName::from_queue_name),
        failed_stage: failed_stage.as_deref().and_then(StageName::from_queue_name),
        progress_percent: row.get::<i32, _>("progress_percent") as u8,
        stages_completed: row.get::<i32, _>("stages_completed") as u32,
        stage_errors,
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.get("completed_at"),
    }
}

fn parse_status(raw: &str) -> WorkflowStatus {
    match raw {
        "pending" => WorkflowStatus::Pending,
        "processing" => WorkflowStatus::Processing,
        "completed" => WorkflowStatus::Completed,
        "failed" => WorkflowStatus::Failed,
        other => {
            tracing::warn!(status = other, "unrecognized workflow status, defaulting to processing");
            WorkflowStatus::Processing
        }
    }
}
