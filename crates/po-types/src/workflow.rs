//! `WorkflowExecution` (spec.md §3) — the Orchestrator's authoritative
//! record of one pipeline run.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MerchantId, PurchaseOrderId, WorkflowId};
use crate::stage::StageName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct WorkflowExecution {
    pub workflow_id: WorkflowId,
    pub purchase_order_id: PurchaseOrderId,
    pub merchant_id: MerchantId,
    pub status: WorkflowStatus,
    pub current_stage: Option<StageName>,
    pub failed_stage: Option<StageName>,
    pub progress_percent: u8,
    pub stages_completed: u32,
    pub stage_errors: HashMap<String, String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    pub fn new(purchase_order_id: PurchaseOrderId, merchant_id: MerchantId) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: WorkflowId::new(),
            purchase_order_id,
            merchant_id,
            status: WorkflowStatus::Pending,
            current_stage: None,
            failed_stage: None,
            progress_percent: 0,
            stages_completed: 0,
            stage_errors: HashMap::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// spec.md §3 invariant 3: liveness is judged by `updated_at` advancing
    /// on every stage transition.
    pub fn is_stale(&self, now: DateTime<Utc>, stall_threshold: chrono::Duration) -> bool {
        self.status == WorkflowStatus::Processing && now - self.updated_at >= stall_threshold
    }
}

/// Progress snapshot returned by `GET /workflow/{id}/status` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatusView {
    pub status: WorkflowStatus,
    pub current_stage: Option<StageName>,
    pub progress_percent: u8,
    pub stages_completed: u32,
    pub updated_at: DateTime<Utc>,
}

impl From<&WorkflowExecution> for WorkflowStatusView {
    fn from(w: &WorkflowExecution) -> Self {
        Self {
            status: w.status,
            current_stage: w.current_stage,
            progress_percent: w.progress_percent,
            stages_completed: w.stages_completed,
            updated_at: w.updated_at,
        }
    }
}
