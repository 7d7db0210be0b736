//! The transactional writer invoked by `database_save` (spec.md §4.9).
//!
//! Grounded on the teacher's `PostgresWorkflowEventStore::append_events`
//! pattern (everything inside one `sqlx::Transaction`, optimistic checks
//! before commit), adapted from event-append semantics to the spec's
//! replace-all PO + line-item write.

use std::sync::Arc;

use po_db::{Gateway, TransactionOptions};
use po_types::{MerchantId, NewLineItem, PurchaseOrderId, PurchaseOrderUpdate, Supplier};
use sqlx::Row;
use tracing::instrument;

use crate::conflict::{resolve_create_number, resolve_update_number};
use crate::error::{PersistenceError, PersistenceResult};
use crate::sku::generate_sku;
use crate::supplier::find_best_match;

pub struct DatabaseSaveInput {
    /// `Upload.metadata.purchaseOrderId`, when present, is authoritative
    /// (spec.md §3 invariant 5): the persistence stage updates that PO
    /// rather than creating a new one.
    pub purchase_order_id_hint: Option<PurchaseOrderId>,
    pub merchant_id: MerchantId,
    pub update: PurchaseOrderUpdate,
    pub line_items: Vec<NewLineItem>,
    /// Pre-fetched by the caller outside any transaction — the fuzzy match
    /// itself may be slow (spec.md §4.9).
    pub known_suppliers: Vec<Supplier>,
}

#[derive(Debug, Clone)]
pub struct PersistOutcome {
    pub purchase_order_id: PurchaseOrderId,
    pub number: String,
    pub line_item_count: usize,
}

pub struct PersistenceService {
    gateway: Arc<Gateway>,
}

impl PersistenceService {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    #[instrument(skip(self, input))]
    pub async fn persist(&self, input: DatabaseSaveInput, now_millis: i64) -> PersistenceResult<PersistOutcome> {
        // Pre-transaction: fuzzy supplier match (may be slow) and
        // deterministic SKU assignment happen outside the transaction body.
        let resolved_supplier_name = input
            .update
            .supplier_name
            .as_deref()
            .and_then(|name| find_best_match(&input.known_suppliers, name).map(|s| s.name.clone()))
            .or_else(|| input.update.supplier_name.clone());

        let skus: Vec<String> = input
            .line_items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                if item.sku.trim().is_empty() {
                    generate_sku(&item.product_name, i)
                } else {
                    item.sku.clone()
                }
            })
            .collect();

        let line_item_input_count = input.line_items.len();

        let outcome = self
            .gateway
            .transaction(TransactionOptions::default(), move |tx| {
                let input = input;
                let skus = skus;
                let resolved_supplier_name = resolved_supplier_name.clone();
                Box::pin(async move {
                    let (purchase_order_id, number) = match input.purchase_order_id_hint {
                        Some(existing_id) => {
                            let incumbent: String =
                                sqlx::query_scalar("SELECT number FROM purchase_orders WHERE id = $1")
                                    .bind(existing_id.as_uuid())
                                    .fetch_one(&mut **tx)
                                    .await?;
                            let number = resolve_update_number(&incumbent);

                            sqlx::query(
                                r#"
                                UPDATE purchase_orders
                                SET supplier_name = $2, order_date = $3, due_date = $4,
                                    total_amount = $5, currency = $6, confidence = $7,
                                    raw_data = $8, updated_at = now()
                                WHERE id = $1
                                "#,
                            )
                            .bind(existing_id.as_uuid())
                            .bind(&resolved_supplier_name)
                            .bind(input.update.order_date)
                            .bind(input.update.due_date)
                            .bind(input.update.total_amount)
                            .bind(&input.update.currency)
                            .bind(input.update.confidence)
                            .bind(&input.update.raw_data)
                            .execute(&mut **tx)
                            .await?;

                            (existing_id, number)
                        }
                        None => {
                            let number =
                                resolve_create_number(&mut **tx, input.merchant_id, &input.update.number, now_millis)
                                    .await
                                    .map_err(to_sqlx)?;
                            let new_id = PurchaseOrderId::new();
                            sqlx::query(
                                r#"
                                INSERT INTO purchase_orders
                                    (id, merchant_id, number, supplier_name, order_date, due_date,
                                     total_amount, currency, status, confidence, job_status, raw_data, updated_at)
                                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'processing', $9, 'running', $10, now())
                                "#,
                            )
                            .bind(new_id.as_uuid())
                            .bind(input.merchant_id.as_uuid())
                            .bind(&number)
                            .bind(&resolved_supplier_name)
                            .bind(input.update.order_date)
                            .bind(input.update.due_date)
                            .bind(input.update.total_amount)
                            .bind(&input.update.currency)
                            .bind(input.update.confidence)
                            .bind(&input.update.raw_data)
                            .execute(&mut **tx)
                            .await?;
                            (new_id, number)
                        }
                    };

                    sqlx::query("DELETE FROM po_line_items WHERE purchase_order_id = $1")
                        .bind(purchase_order_id.as_uuid())
                        .execute(&mut **tx)
                        .await?;

                    for (i, item) in input.line_items.iter().enumerate() {
                        let quantity = item.resolved_quantity();
                        let total_cost = item.resolved_total_cost();
                        sqlx::query(
                            r#"
                            INSERT INTO po_line_items
                                (id, purchase_order_id, sku, product_name, description,
                                 quantity, unit_cost, total_cost, confidence, raw_data)
                            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9)
                            "#,
                        )
                        .bind(purchase_order_id.as_uuid())
                        .bind(&skus[i])
                        .bind(&item.product_name)
                        .bind(&item.description)
                        .bind(quantity)
                        .bind(item.unit_cost)
                        .bind(total_cost)
                        .bind(item.confidence)
                        .bind(&item.raw_data)
                        .execute(&mut **tx)
                        .await?;
                    }

                    sqlx::query(
                        "INSERT INTO audit_records (id, purchase_order_id, confidence, raw_payload, created_at) \
                         VALUES (gen_random_uuid(), $1, $2, $3, now())",
                    )
                    .bind(purchase_order_id.as_uuid())
                    .bind(input.update.confidence)
                    .bind(&input.update.raw_data)
                    .execute(&mut **tx)
                    .await?;

                    let row = sqlx::query("SELECT COUNT(*) AS c FROM po_line_items WHERE purchase_order_id = $1")
                        .bind(purchase_order_id.as_uuid())
                        .fetch_one(&mut **tx)
                        .await?;
                    let found: i64 = row.try_get("c")?;

                    // Abort before commit rather than after (spec.md §4.9
                    // step 5): a mismatch here must roll back the whole
                    // write, not leave it committed and only then error.
                    if line_item_input_count > 0 && found == 0 {
                        return Err(to_sqlx(PersistenceError::LineItemCountMismatch {
                            expected: line_item_input_count,
                            found,
                        }));
                    }

                    Ok((purchase_order_id, number, found))
                })
            })
            .await?;

        let (purchase_order_id, number, found) = outcome;
        Ok(PersistOutcome { purchase_order_id, number, line_item_count: found as usize })
    }
}

fn to_sqlx(err: PersistenceError) -> sqlx::Error {
    match err {
        PersistenceError::Query(e) => e,
        PersistenceError::Database(po_db::GatewayError::Query(e)) => e,
        other => sqlx::Error::Protocol(other.to_string()),
    }
}
