//! The Ingress Adapter (spec.md §2.8, §4's "Ingress → Queue(stage₁)" data
//! flow entry point): accepts an uploaded file, creates a placeholder PO
//! row, stores an `Upload` row carrying the PO id, and enqueues
//! `ai_parsing`.
//!
//! Blob storage is one of the pluggable capabilities the core treats as an
//! external collaborator (spec.md §1); this adapter writes the bytes to a
//! local staging directory and records that path as `Upload.fileUrl` rather
//! than depending on a specific object-store SDK the teacher never pulls in.

use std::path::PathBuf;

use axum::extract::{Multipart, State};
use axum::Json;
use po_types::{CreateUpload, PlaceholderPurchaseOrder, PurchaseOrder};
use serde::Serialize;
use serde_json::json;
use sqlx::Row;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::AuthenticatedMerchant;
use crate::error::ApiError;
use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const STAGING_DIR: &str = "./uploads";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub upload_id: Uuid,
    pub workflow_id: String,
    pub po_id: Uuid,
}

/// `POST /upload` (spec.md §6): `merchantId` is derived from the
/// authenticated principal, never trusted from the multipart body (spec.md
/// §7 multi-tenant isolation rule); a `merchantId` form field, if present,
/// is accepted for client compatibility and ignored.
#[instrument(skip(state, multipart))]
pub async fn upload(
    State(state): State<AppState>,
    AuthenticatedMerchant(merchant_id): AuthenticatedMerchant,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name = String::from("upload.bin");
    let mut mime_type = String::from("application/octet-stream");

    while let Some(field) = multipart.next_field().await.map_err(|err| ApiError::BadRequest(err.to_string()))? {
        if field.name() == Some("file") {
            file_name = field.file_name().unwrap_or("upload.bin").to_string();
            mime_type = field.content_type().unwrap_or("application/octet-stream").to_string();
            let data = field.bytes().await.map_err(|err| ApiError::BadRequest(err.to_string()))?;
            if data.len() > MAX_UPLOAD_BYTES {
                return Err(ApiError::BadRequest("file exceeds the maximum upload size".into()));
            }
            file_bytes = Some(data.to_vec());
        }
        // Any other field (e.g. a client-supplied merchantId) is drained and dropped.
    }

    let bytes = file_bytes.ok_or_else(|| ApiError::BadRequest("missing file field".into()))?;

    let upload_id = Uuid::now_v7();
    tokio::fs::create_dir_all(STAGING_DIR).await.map_err(|err| {
        tracing::error!(%err, "failed to create upload staging directory");
        ApiError::BadRequest("upload storage unavailable".into())
    })?;
    let file_path: PathBuf = PathBuf::from(STAGING_DIR).join(upload_id.to_string());
    tokio::fs::write(&file_path, &bytes).await.map_err(|err| {
        tracing::error!(%err, "failed to stage uploaded file");
        ApiError::BadRequest("upload storage unavailable".into())
    })?;

    let pool = state.gateway.client().await?;

    let now_millis = chrono::Utc::now().timestamp_millis();
    let placeholder = PlaceholderPurchaseOrder { merchant_id, number: PurchaseOrder::placeholder_number(now_millis) };

    let po_row = sqlx::query(
        r#"
        INSERT INTO purchase_orders
            (id, merchant_id, number, total_amount, currency, status, confidence, job_status, raw_data, updated_at)
        VALUES (gen_random_uuid(), $1, $2, 0, 'USD', 'processing', 0, 'pending', '{}'::jsonb, now())
        RETURNING id
        "#,
    )
    .bind(merchant_id.as_uuid())
    .bind(&placeholder.number)
    .fetch_one(pool)
    .await?;
    let purchase_order_id: Uuid = po_row.get("id");

    let create_upload = CreateUpload {
        merchant_id,
        file_name: upload_id.to_string(),
        original_file_name: file_name,
        file_size: bytes.len() as i64,
        mime_type,
        file_url: file_path.to_string_lossy().into_owned(),
    };

    let exec = state
        .orchestrator
        .start_workflow(po_types::PurchaseOrderId::from_uuid(purchase_order_id), merchant_id)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO uploads
            (id, merchant_id, file_name, original_file_name, file_size, mime_type, file_url, status, metadata, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'processing', $8, now())
        "#,
    )
    .bind(upload_id)
    .bind(create_upload.merchant_id.as_uuid())
    .bind(&create_upload.file_name)
    .bind(&create_upload.original_file_name)
    .bind(create_upload.file_size)
    .bind(&create_upload.mime_type)
    .bind(&create_upload.file_url)
    .bind(json!({ "purchaseOrderId": purchase_order_id, "workflowId": exec.workflow_id.to_string() }))
    .execute(pool)
    .await?;

    info!(%upload_id, workflow_id = %exec.workflow_id, %purchase_order_id, "ingress accepted upload");

    Ok(Json(UploadResponse { upload_id, workflow_id: exec.workflow_id.to_string(), po_id: purchase_order_id }))
}
