//! Route handlers beyond ingress: workflow status, PO reads, reprocess,
//! realtime SSE and queue admin (spec.md §6 endpoint table).

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use po_types::{PurchaseOrderId, StageName, WorkflowStatusView};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::Row;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::{resolve_shop, AuthenticatedMerchant};
use crate::error::ApiError;
use crate::state::AppState;

/// `GET /workflow/{id}/status` (spec.md §6).
#[instrument(skip(state))]
pub async fn workflow_status(
    State(state): State<AppState>,
    AuthenticatedMerchant(merchant_id): AuthenticatedMerchant,
    Path(workflow_id): Path<String>,
) -> Result<Json<WorkflowStatusView>, ApiError> {
    let pool = state.gateway.client().await?;
    let row = sqlx::query(
        r#"
        SELECT status, current_stage, progress_percent, stages_completed, updated_at
        FROM workflow_executions WHERE workflow_id = $1 AND merchant_id = $2
        "#,
    )
    .bind(&workflow_id)
    .bind(merchant_id.as_uuid())
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound)?;

    let status: String = row.get("status");
    let current_stage: Option<String> = row.get("current_stage");
    Ok(Json(WorkflowStatusView {
        status: parse_workflow_status(&status),
        current_stage: current_stage.as_deref().and_then(StageName::from_queue_name),
        progress_percent: row.get::<i32, _>("progress_percent") as u8,
        stages_completed: row.get::<i32, _>("stages_completed") as u32,
        updated_at: row.get("updated_at"),
    }))
}

fn parse_workflow_status(raw: &str) -> po_types::WorkflowStatus {
    match raw {
        "pending" => po_types::WorkflowStatus::Pending,
        "completed" => po_types::WorkflowStatus::Completed,
        "failed" => po_types::WorkflowStatus::Failed,
        _ => po_types::WorkflowStatus::Processing,
    }
}

#[derive(Debug, Serialize)]
pub struct PurchaseOrderView {
    pub id: Uuid,
    pub number: String,
    pub supplier_name: Option<String>,
    pub total_amount: f64,
    pub currency: String,
    pub status: po_types::PurchaseOrderStatus,
    pub confidence: f64,
    pub job_status: po_types::JobStatus,
    pub job_error: Option<String>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// `GET /purchase-orders/{id}` (spec.md §6), scoped by the caller's
/// merchant id (spec.md §7 multi-tenant isolation rule).
#[instrument(skip(state))]
pub async fn get_purchase_order(
    State(state): State<AppState>,
    AuthenticatedMerchant(merchant_id): AuthenticatedMerchant,
    Path(po_id): Path<Uuid>,
) -> Result<Json<PurchaseOrderView>, ApiError> {
    let pool = state.gateway.client().await?;
    let row = sqlx::query(
        r#"
        SELECT id, number, supplier_name, total_amount, currency, status, confidence,
               job_status, job_error, updated_at
        FROM purchase_orders WHERE id = $1 AND merchant_id = $2
        "#,
    )
    .bind(po_id)
    .bind(merchant_id.as_uuid())
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound)?;

    let status: String = row.get("status");
    let job_status: String = row.get("job_status");
    Ok(Json(PurchaseOrderView {
        id: row.get("id"),
        number: row.get("number"),
        supplier_name: row.get("supplier_name"),
        total_amount: row.get("total_amount"),
        currency: row.get("currency"),
        status: parse_po_status(&status),
        confidence: row.get("confidence"),
        job_status: parse_job_status(&job_status),
        job_error: row.get("job_error"),
        updated_at: row.get("updated_at"),
    }))
}

fn parse_po_status(raw: &str) -> po_types::PurchaseOrderStatus {
    use po_types::PurchaseOrderStatus::*;
    match raw {
        "review_needed" => ReviewNeeded,
        "completed" => Completed,
        "failed" => Failed,
        "denied" => Denied,
        _ => Processing,
    }
}

fn parse_job_status(raw: &str) -> po_types::JobStatus {
    use po_types::JobStatus::*;
    match raw {
        "running" => Running,
        "completed" => Completed,
        "failed" => Failed,
        _ => Pending,
    }
}

/// `POST /purchase-orders/{id}/reprocess` (spec.md §6): re-enqueues
/// `ai_parsing` for the PO's latest Upload. 404 if no upload exists; 409 if
/// a workflow for this PO is already processing.
#[instrument(skip(state))]
pub async fn reprocess_purchase_order(
    State(state): State<AppState>,
    AuthenticatedMerchant(merchant_id): AuthenticatedMerchant,
    Path(po_id): Path<Uuid>,
) -> Result<axum::http::StatusCode, ApiError> {
    let pool = state.gateway.client().await?;

    let already_running = sqlx::query(
        "SELECT 1 FROM workflow_executions WHERE purchase_order_id = $1 AND merchant_id = $2 AND status = 'processing'",
    )
    .bind(po_id)
    .bind(merchant_id.as_uuid())
    .fetch_optional(pool)
    .await?;
    if already_running.is_some() {
        return Err(ApiError::Conflict("a workflow for this purchase order is already processing".into()));
    }

    let upload_row = sqlx::query(
        r#"
        SELECT id FROM uploads
        WHERE merchant_id = $1 AND metadata->>'purchaseOrderId' = $2
        ORDER BY created_at DESC LIMIT 1
        "#,
    )
    .bind(merchant_id.as_uuid())
    .bind(po_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound)?;
    let upload_id: Uuid = upload_row.get("id");

    let exec = state
        .orchestrator
        .start_workflow(PurchaseOrderId::from_uuid(po_id), merchant_id)
        .await?;

    sqlx::query("UPDATE uploads SET status = 'processing', metadata = metadata || $2 WHERE id = $1")
        .bind(upload_id)
        .bind(json!({ "workflowId": exec.workflow_id.to_string() }))
        .execute(pool)
        .await?;

    info!(%po_id, workflow_id = %exec.workflow_id, "reprocess requested");
    Ok(axum::http::StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct RealtimeQuery {
    pub shop: String,
}

/// `GET /realtime/events?shop={shopDomain}` (spec.md §6): `EventSource`
/// cannot send an `Authorization` header, so the shop domain is resolved
/// against the merchants table instead of trusted outright (spec.md §7).
/// Subscribes to all four Progress Bus channels for the resolved merchant.
#[instrument(skip(state))]
pub async fn realtime_events(
    State(state): State<AppState>,
    Query(query): Query<RealtimeQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let merchant = resolve_shop(&state, &query.shop).await.ok_or(ApiError::Unauthorized)?;
    let merchant_id = merchant.id;

    let mut pubsub = state.queue.pubsub().await.map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let channels = [
        po_runtime::channel_name(merchant_id, po_runtime::ProgressChannel::Progress),
        po_runtime::channel_name(merchant_id, po_runtime::ProgressChannel::Stage),
        po_runtime::channel_name(merchant_id, po_runtime::ProgressChannel::Completion),
        po_runtime::channel_name(merchant_id, po_runtime::ProgressChannel::Error),
    ];

    for channel in &channels {
        if let Err(err) = pubsub.subscribe(channel).await {
            warn!(%err, %channel, "failed to subscribe realtime channel");
        }
    }

    let raw_stream = pubsub.into_on_message().map(|msg| {
        let channel = msg.get_channel_name().to_string();
        let payload: String = msg.get_payload().unwrap_or_default();
        let event_name = channel.rsplit(':').next().unwrap_or("progress").to_string();
        Ok(SseEvent::default().event(event_name).data(payload))
    });

    let connected = stream::once(async { Ok(SseEvent::default().event("connected").data(r#"{"status":"connected"}"#)) });
    let stream = connected.chain(raw_stream);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

#[derive(Debug, Serialize)]
pub struct QueueAdminStatus {
    pub queues: Vec<QueueStatusEntry>,
}

#[derive(Debug, Serialize)]
pub struct QueueStatusEntry {
    pub name: &'static str,
    pub ready: u64,
    pub in_flight: u64,
    pub dead_letter: u64,
}

/// `GET /queue-admin/status` (spec.md §6 operational surface, derived from
/// §4.2's named-queue model).
#[instrument(skip(state))]
pub async fn queue_admin_status(State(state): State<AppState>) -> Result<Json<QueueAdminStatus>, ApiError> {
    let mut queues = Vec::with_capacity(po_queue::QUEUE_NAMES.len());
    for name in po_queue::QUEUE_NAMES {
        let (ready, in_flight, dead_letter) =
            state.queue.depths(name).await.map_err(|err| ApiError::BadRequest(err.to_string()))?;
        queues.push(QueueStatusEntry { name, ready, in_flight, dead_letter });
    }
    Ok(Json(QueueAdminStatus { queues }))
}

#[derive(Debug, Deserialize)]
pub struct QueueNameQuery {
    pub queue: String,
}

/// `GET /queue-admin/failed-jobs?queue={name}`.
#[instrument(skip(state))]
pub async fn queue_admin_failed_jobs(
    State(state): State<AppState>,
    Query(query): Query<QueueNameQuery>,
) -> Result<Json<Vec<po_queue::Job>>, ApiError> {
    if !po_queue::is_known_queue(&query.queue) {
        return Err(ApiError::BadRequest(format!("unknown queue: {}", query.queue)));
    }
    let jobs = state.queue.dead_letter(&query.queue).await.map_err(|err| ApiError::BadRequest(err.to_string()))?;
    Ok(Json(jobs))
}

/// `POST /queue-admin/clean-failed?queue={name}`.
#[instrument(skip(state))]
pub async fn queue_admin_clean_failed(
    State(state): State<AppState>,
    Query(query): Query<QueueNameQuery>,
) -> Result<Json<Value>, ApiError> {
    if !po_queue::is_known_queue(&query.queue) {
        return Err(ApiError::BadRequest(format!("unknown queue: {}", query.queue)));
    }
    let cleared = state.queue.clear_dead_letter(&query.queue).await.map_err(|err| ApiError::BadRequest(err.to_string()))?;
    Ok(Json(json!({ "cleared": cleared })))
}
