//! Per-stage work invoked through `Orchestrator::run_stage` (spec.md
//! §4.6's fixed DAG). Each function receives the merged accumulator and
//! returns either the fragment to merge in or an error string for
//! `failWorkflow`.

use std::sync::Arc;

use po_db::Gateway;
use po_orchestrator::Orchestrator;
use po_persistence::{DatabaseSaveInput, PersistenceService};
use po_queue::{Handler, Job, QueueRuntime};
use po_types::capabilities::{AIParser, ImageSearcher, ShopifyClient};
use po_types::{
    status_for_confidence, MerchantId, NewLineItem, PurchaseOrderId, PurchaseOrderUpdate, StageName, Supplier,
    SupplierId, WorkflowId,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::Row;
use tracing::warn;
use uuid::Uuid;

pub struct StageContext {
    pub gateway: Arc<Gateway>,
    pub queue: Arc<QueueRuntime>,
    pub persistence: Arc<PersistenceService>,
    pub ai_parser: Arc<dyn AIParser>,
    pub shopify_client: Arc<dyn ShopifyClient>,
    pub image_searcher: Arc<dyn ImageSearcher>,
    pub async_image_processing: bool,
}

#[derive(Debug, Deserialize)]
struct JobPayload {
    workflow_id: String,
    purchase_order_id: Uuid,
    merchant_id: Uuid,
}

/// Builds the `Handler` registered on `stage.queue_name()`: parses the job
/// payload, then drives the stage through the orchestrator's standard
/// load/lock/invoke/advance plumbing.
pub fn handler_for(stage: StageName, ctx: Arc<StageContext>, orchestrator: Arc<Orchestrator>) -> Handler {
    Arc::new(move |job: Job| {
        let ctx = ctx.clone();
        let orchestrator = orchestrator.clone();
        Box::pin(async move {
            let payload: JobPayload = serde_json::from_value(job.payload).map_err(|err| err.to_string())?;
            let workflow_id = WorkflowId(payload.workflow_id);
            let purchase_order_id = PurchaseOrderId::from_uuid(payload.purchase_order_id);
            let merchant_id = MerchantId::from_uuid(payload.merchant_id);

            orchestrator
                .run_stage(&workflow_id, stage, move |accumulated| {
                    let ctx = ctx.clone();
                    async move { dispatch(stage, &ctx, purchase_order_id, merchant_id, accumulated).await }
                })
                .await
                .map_err(|err| err.to_string())
        })
    })
}

async fn dispatch(
    stage: StageName,
    ctx: &StageContext,
    purchase_order_id: PurchaseOrderId,
    merchant_id: MerchantId,
    accumulated: Value,
) -> Result<Value, String> {
    match stage {
        StageName::AiParsing => ai_parsing(ctx, purchase_order_id).await,
        StageName::DatabaseSave => database_save(ctx, purchase_order_id, merchant_id, accumulated).await,
        StageName::DataNormalization => data_normalization(accumulated).await,
        StageName::MerchantConfig => merchant_config(ctx, merchant_id, accumulated).await,
        StageName::AiEnrichment => ai_enrichment(ctx, purchase_order_id, accumulated).await,
        StageName::ShopifyPayload => shopify_payload(accumulated).await,
        StageName::ProductDraftCreation => product_draft_creation(accumulated).await,
        StageName::ImageAttachment => image_attachment(ctx, purchase_order_id, accumulated).await,
        StageName::ShopifySync => shopify_sync(ctx, accumulated).await,
        StageName::StatusUpdate => status_update(ctx, purchase_order_id, accumulated).await,
    }
}

/// Fetches the PO's latest Upload, reads the staged bytes, and hands them
/// to the configured `AIParser` (spec.md §6 `AIParser.Parse`).
async fn ai_parsing(ctx: &StageContext, purchase_order_id: PurchaseOrderId) -> Result<Value, String> {
    let pool = ctx.gateway.client().await.map_err(|e| e.to_string())?;
    let upload = sqlx::query(
        r#"
        SELECT file_url, mime_type FROM uploads
        WHERE metadata->>'purchaseOrderId' = $1
        ORDER BY created_at DESC LIMIT 1
        "#,
    )
    .bind(purchase_order_id.as_uuid().to_string())
    .fetch_optional(pool)
    .await
    .map_err(|e| e.to_string())?
    .ok_or_else(|| "no upload found for this purchase order".to_string())?;

    let file_url: String = upload.get("file_url");
    let mime_type: String = upload.get("mime_type");
    let bytes = tokio::fs::read(&file_url).await.map_err(|e| format!("failed to read staged upload: {e}"))?;

    let parsed = ctx.ai_parser.parse(&bytes, &mime_type, &json!({})).await.map_err(|e| e.to_string())?;
    Ok(json!({ "extractedData": parsed.extracted_data, "confidence": parsed.confidence }))
}

/// Invokes the Persistence Service (spec.md §4.9) with the AI's extracted
/// fields. `purchase_order_id_hint` is always set here: the Ingress Adapter
/// always creates a placeholder PO before the workflow starts (spec.md §3
/// invariant 5), so `database_save` always takes the UPDATE path in this
/// deployment; the CREATE path (§4.7) still exists in `po-persistence` for
/// ingestion routes that don't pre-create a PO.
async fn database_save(
    ctx: &StageContext,
    purchase_order_id: PurchaseOrderId,
    merchant_id: MerchantId,
    accumulated: Value,
) -> Result<Value, String> {
    let extracted = accumulated.get("extractedData").cloned().unwrap_or(json!({}));
    let confidence = accumulated.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);

    let update = PurchaseOrderUpdate {
        number: extracted.get("number").and_then(Value::as_str).unwrap_or_default().to_string(),
        supplier_name: extracted.get("supplierName").and_then(Value::as_str).map(str::to_string),
        order_date: extracted.get("orderDate").and_then(Value::as_str).and_then(|s| s.parse().ok()),
        due_date: extracted.get("dueDate").and_then(Value::as_str).and_then(|s| s.parse().ok()),
        total_amount: line_items_total(&extracted),
        currency: extracted.get("currency").and_then(Value::as_str).unwrap_or("USD").to_string(),
        confidence,
        raw_data: extracted.clone(),
    };

    let line_items = extracted
        .get("lineItems")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|item| NewLineItem {
            sku: item.get("sku").and_then(Value::as_str).unwrap_or_default().to_string(),
            product_name: item.get("productName").and_then(Value::as_str).unwrap_or_default().to_string(),
            description: item.get("description").and_then(Value::as_str).map(str::to_string),
            quantity: item.get("quantity").and_then(Value::as_i64).map(|q| q as i32),
            unit_cost: item.get("unitCost").and_then(Value::as_f64),
            confidence,
            raw_data: item,
        })
        .collect();

    let known_suppliers = fetch_known_suppliers(ctx, merchant_id).await?;

    let now_millis = chrono::Utc::now().timestamp_millis();
    let input = DatabaseSaveInput {
        purchase_order_id_hint: Some(purchase_order_id),
        merchant_id,
        update,
        line_items,
        known_suppliers,
    };
    let outcome = ctx.persistence.persist(input, now_millis).await.map_err(|e| e.to_string())?;

    Ok(json!({
        "poNumber": outcome.number,
        "lineItemCount": outcome.line_item_count,
        "confidence": confidence,
    }))
}

fn line_items_total(extracted: &Value) -> f64 {
    extracted
        .get("lineItems")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    let qty = item.get("quantity").and_then(Value::as_f64).unwrap_or(1.0);
                    let cost = item.get("unitCost").and_then(Value::as_f64).unwrap_or(0.0);
                    qty * cost
                })
                .sum()
        })
        .unwrap_or(0.0)
}

async fn fetch_known_suppliers(ctx: &StageContext, merchant_id: MerchantId) -> Result<Vec<Supplier>, String> {
    let pool = ctx.gateway.client().await.map_err(|e| e.to_string())?;
    let rows = sqlx::query("SELECT id, name, normalized_name FROM suppliers WHERE merchant_id = $1")
        .bind(merchant_id.as_uuid())
        .fetch_all(pool)
        .await
        .map_err(|e| e.to_string())?;
    Ok(rows
        .into_iter()
        .map(|row| Supplier {
            id: SupplierId::from_uuid(row.get("id")),
            merchant_id,
            name: row.get("name"),
            normalized_name: row.get("normalized_name"),
        })
        .collect())
}

/// Trims string fields and clamps confidence; the heavier normalization
/// rules are merchant-specific and live outside this core (spec.md §1
/// scope).
async fn data_normalization(mut accumulated: Value) -> Result<Value, String> {
    if let Some(confidence) = accumulated.get("confidence").and_then(Value::as_f64) {
        accumulated["confidence"] = json!(confidence.clamp(0.0, 1.0));
    }
    accumulated["normalized"] = json!(true);
    Ok(accumulated)
}

/// Merges the merchant's workflow-mode feature flag into the accumulator
/// (spec.md §6 "Merchant feature flag: sequential vs legacy workflow").
async fn merchant_config(ctx: &StageContext, merchant_id: MerchantId, mut accumulated: Value) -> Result<Value, String> {
    let pool = ctx.gateway.client().await.map_err(|e| e.to_string())?;
    let row = sqlx::query("SELECT status, settings FROM merchants WHERE id = $1")
        .bind(merchant_id.as_uuid())
        .fetch_optional(pool)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "merchant not found".to_string())?;

    let status: String = row.get("status");
    if status != "active" {
        return Err("merchant is not active".into());
    }
    let settings: Value = row.get("settings");
    let sequential = settings.get("workflowMode").and_then(Value::as_str).map(|v| v != "legacy").unwrap_or(true);
    accumulated["sequentialWorkflow"] = json!(sequential);
    Ok(accumulated)
}

/// A second `AIParser.Parse` pass over the persisted raw payload (the
/// capability doc comment on `po_types::capabilities::AIParser` calls out
/// both `ai_parsing` and `ai_enrichment` as its callers).
async fn ai_enrichment(ctx: &StageContext, purchase_order_id: PurchaseOrderId, mut accumulated: Value) -> Result<Value, String> {
    let pool = ctx.gateway.client().await.map_err(|e| e.to_string())?;
    let raw_data: Value = sqlx::query_scalar("SELECT raw_data FROM purchase_orders WHERE id = $1")
        .bind(purchase_order_id.as_uuid())
        .fetch_one(pool)
        .await
        .map_err(|e| e.to_string())?;

    let buffer = serde_json::to_vec(&raw_data).map_err(|e| e.to_string())?;
    let enriched = ctx
        .ai_parser
        .parse(&buffer, "application/json", &json!({ "mode": "enrichment" }))
        .await
        .map_err(|e| e.to_string())?;
    accumulated["enrichedData"] = enriched.extracted_data;
    Ok(accumulated)
}

/// Builds the Shopify product draft payload from the accumulated data.
async fn shopify_payload(mut accumulated: Value) -> Result<Value, String> {
    let extracted = accumulated.get("extractedData").cloned().unwrap_or(json!({}));
    let draft = json!({
        "title": extracted.get("supplierName").cloned().unwrap_or(json!("Imported product")),
        "variants": extracted.get("lineItems").cloned().unwrap_or(json!([])),
    });
    accumulated["shopifyDraft"] = draft;
    Ok(accumulated)
}

/// Validates the draft is complete enough to sync; a real deployment might
/// also persist a local draft record here. No local draft table exists in
/// this core's data model (spec.md §3), so this stage is pass-through.
async fn product_draft_creation(accumulated: Value) -> Result<Value, String> {
    if accumulated.get("shopifyDraft").is_none() {
        return Err("no shopify draft to create a product from".into());
    }
    Ok(accumulated)
}

/// Async mode (default, spec.md §4.6) fires a best-effort background job
/// and advances immediately; synchronous mode blocks on `ImageSearcher`.
async fn image_attachment(ctx: &StageContext, purchase_order_id: PurchaseOrderId, mut accumulated: Value) -> Result<Value, String> {
    let query = accumulated
        .get("extractedData")
        .and_then(|v| v.get("supplierName"))
        .and_then(Value::as_str)
        .unwrap_or("product")
        .to_string();

    if ctx.async_image_processing {
        ctx.queue
            .enqueue(
                po_types::stage::BACKGROUND_IMAGE_PROCESSING_QUEUE,
                json!({ "purchase_order_id": purchase_order_id.as_uuid(), "query": query }),
                po_queue::EnqueueOptions::default(),
            )
            .await
            .map_err(|e| e.to_string())?;
        accumulated["imagesPending"] = json!(true);
    } else {
        let images = ctx.image_searcher.search(&query).await.map_err(|e| e.to_string())?;
        accumulated["images"] = json!(images);
    }
    Ok(accumulated)
}

async fn shopify_sync(ctx: &StageContext, mut accumulated: Value) -> Result<Value, String> {
    let draft = accumulated.get("shopifyDraft").cloned().unwrap_or(json!({}));
    let result = ctx.shopify_client.sync_product_draft(&draft).await.map_err(|e| e.to_string())?;
    accumulated["shopifyProductId"] = json!(result.product_id);
    accumulated["shopifyVariantId"] = json!(result.variant_id);
    Ok(accumulated)
}

/// Terminal stage: writes the final PO status from the confidence threshold
/// (spec.md §4.6).
async fn status_update(ctx: &StageContext, purchase_order_id: PurchaseOrderId, accumulated: Value) -> Result<Value, String> {
    let confidence = accumulated.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);
    let status = status_for_confidence(confidence);
    let status_str = match status {
        po_types::PurchaseOrderStatus::Completed => "completed",
        po_types::PurchaseOrderStatus::ReviewNeeded => "review_needed",
        _ => "review_needed",
    };

    ctx.gateway
        .run_retryable(move |pool| async move {
            sqlx::query(
                "UPDATE purchase_orders SET status = $2, job_status = 'completed', completed_at = now(), updated_at = now() WHERE id = $1",
            )
            .bind(purchase_order_id.as_uuid())
            .bind(status_str)
            .execute(&pool)
            .await?;
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?;

    Ok(accumulated)
}

/// `background_image_processing` handler (spec.md §4.2): not part of the
/// linear DAG, so it bypasses `Orchestrator::run_stage` entirely. Best
/// effort: failures here never fail the workflow that spawned it.
pub fn background_image_processing_handler(ctx: Arc<StageContext>) -> Handler {
    Arc::new(move |job: Job| {
        let ctx = ctx.clone();
        Box::pin(async move {
            let purchase_order_id = job
                .payload
                .get("purchase_order_id")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| "missing purchase_order_id".to_string())?;
            let query = job.payload.get("query").and_then(Value::as_str).unwrap_or("product");

            match ctx.image_searcher.search(query).await {
                Ok(images) => {
                    tracing::info!(%purchase_order_id, count = images.len(), "background image search complete");
                    Ok(())
                }
                Err(err) => {
                    warn!(%err, %purchase_order_id, "background image search failed, dropping");
                    Ok(())
                }
            }
        })
    })
}
