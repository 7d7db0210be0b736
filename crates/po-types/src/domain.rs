//! Domain rows (spec.md §3).
//!
//! Follows the teacher's `*Row` / `Create*` / `Update*` convention: the row
//! type is what comes back from the database, `Create*`/`Update*` types are
//! the inputs a repository method accepts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{LineItemId, MerchantId, PurchaseOrderId, SupplierId, UploadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MerchantStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone)]
pub struct Merchant {
    pub id: MerchantId,
    pub shop_domain: String,
    pub status: MerchantStatus,
    pub settings: serde_json::Value,
}

impl Merchant {
    pub fn is_active(&self) -> bool {
        self.status == MerchantStatus::Active
    }

    /// spec.md §6: "Merchant feature flag: sequential vs legacy workflow".
    pub fn uses_sequential_workflow(&self) -> bool {
        self.settings
            .get("workflowMode")
            .and_then(|v| v.as_str())
            .map(|v| v != "legacy")
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub id: UploadId,
    pub merchant_id: MerchantId,
    pub file_name: String,
    pub original_file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub file_url: String,
    pub status: UploadStatus,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Upload {
    /// `Upload.metadata.purchaseOrderId` is authoritative for downstream
    /// resolution (spec.md §3 invariant 5).
    pub fn purchase_order_id(&self) -> Option<PurchaseOrderId> {
        self.metadata
            .get("purchaseOrderId")
            .and_then(|v| v.as_str())
            .and_then(|s| uuid::Uuid::parse_str(s).ok())
            .map(PurchaseOrderId::from_uuid)
    }

    pub fn workflow_id(&self) -> Option<crate::ids::WorkflowId> {
        self.metadata
            .get("workflowId")
            .and_then(|v| v.as_str())
            .map(|s| crate::ids::WorkflowId(s.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct CreateUpload {
    pub merchant_id: MerchantId,
    pub file_name: String,
    pub original_file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub file_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Processing,
    ReviewNeeded,
    Completed,
    Failed,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// The confidence threshold that decides `completed` vs `review_needed`
/// (spec.md §4.6, §4.8, §8 S1/S2).
pub const CONFIDENCE_COMPLETE_THRESHOLD: f64 = 0.80;

pub fn status_for_confidence(confidence: f64) -> PurchaseOrderStatus {
    if confidence >= CONFIDENCE_COMPLETE_THRESHOLD {
        PurchaseOrderStatus::Completed
    } else {
        PurchaseOrderStatus::ReviewNeeded
    }
}

#[derive(Debug, Clone)]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    pub merchant_id: MerchantId,
    pub number: String,
    pub supplier_name: Option<String>,
    pub order_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub total_amount: f64,
    pub currency: String,
    pub status: PurchaseOrderStatus,
    pub confidence: f64,
    pub job_status: JobStatus,
    pub job_error: Option<String>,
    pub raw_data: serde_json::Value,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PurchaseOrder {
    /// spec.md §3 invariant 1: a PO in `processing` is "stalled" once it has
    /// gone this long without an update and has no live workflow.
    pub fn is_stale(&self, now: DateTime<Utc>, stall_threshold: chrono::Duration) -> bool {
        self.status == PurchaseOrderStatus::Processing && now - self.updated_at >= stall_threshold
    }

    /// `PO-<epoch_ms>` synthetic number used by the Ingress Adapter for the
    /// placeholder row (spec.md §3, Glossary "Placeholder PO").
    pub fn placeholder_number(now_millis: i64) -> String {
        format!("PO-{now_millis}")
    }
}

#[derive(Debug, Clone)]
pub struct PlaceholderPurchaseOrder {
    pub merchant_id: MerchantId,
    pub number: String,
}

/// Fields the AI parser / persistence stage wants to apply to a PO. Used for
/// both the CREATE and UPDATE paths of conflict resolution (spec.md §4.7).
#[derive(Debug, Clone)]
pub struct PurchaseOrderUpdate {
    pub number: String,
    pub supplier_name: Option<String>,
    pub order_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub total_amount: f64,
    pub currency: String,
    pub confidence: f64,
    pub raw_data: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct POLineItem {
    pub id: LineItemId,
    pub purchase_order_id: PurchaseOrderId,
    pub sku: String,
    pub product_name: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub unit_cost: Option<f64>,
    pub total_cost: Option<f64>,
    pub confidence: f64,
    pub raw_data: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub sku: String,
    pub product_name: String,
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub unit_cost: Option<f64>,
    pub confidence: f64,
    pub raw_data: serde_json::Value,
}

impl NewLineItem {
    /// spec.md §3 invariant 2 and §4.9 step 3: recompute `totalCost` from
    /// quantity and unit cost at insert time rather than trusting the AI's
    /// arithmetic.
    pub fn resolved_quantity(&self) -> i32 {
        self.quantity
            .filter(|q| *q > 0)
            .unwrap_or_else(|| crate::quantity::parse_quantity(&self.product_name))
    }

    pub fn resolved_total_cost(&self) -> Option<f64> {
        self.unit_cost
            .map(|cost| cost * self.resolved_quantity() as f64)
    }
}

#[derive(Debug, Clone)]
pub struct Supplier {
    pub id: SupplierId,
    pub merchant_id: MerchantId,
    pub name: String,
    pub normalized_name: String,
}

#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub purchase_order_id: PurchaseOrderId,
    pub confidence: f64,
    pub raw_payload: serde_json::Value,
}
