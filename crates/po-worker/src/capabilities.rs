//! Dev-mode stand-ins for the pluggable capabilities (spec.md §1 "external
//! collaborators ... consumed via the interfaces in §6"). A real deployment
//! swaps these for an actual AI parser, Shopify client and image search
//! provider; `po-worker` only depends on the traits in
//! `po_types::capabilities`, grounded on the teacher's provider-trait /
//! concrete-impl split for LLM providers (`everruns-core`).
//!
//! The CSV path here exists to make the `ai_parsing` stage exercisable
//! end-to-end without a real AI provider configured; anything else yields a
//! low-confidence empty parse rather than failing the stage outright.

use async_trait::async_trait;
use po_types::capabilities::{AIParser, CapabilityResult, ImageSearcher, ParseResult, ShopifyClient, ShopifySyncResult};
use serde_json::{json, Value};
use uuid::Uuid;

pub struct DevAIParser;

#[async_trait]
impl AIParser for DevAIParser {
    async fn parse(&self, buffer: &[u8], mime_type: &str, _ai_settings: &Value) -> CapabilityResult<ParseResult> {
        if mime_type == "text/csv" {
            if let Ok(text) = std::str::from_utf8(buffer) {
                return Ok(parse_csv(text));
            }
        }
        Ok(ParseResult { extracted_data: json!({ "lineItems": [] }), confidence: 0.0 })
    }
}

/// `SKU,Description,Quantity,Price` rows, one PO per file (spec.md §8 S1).
fn parse_csv(text: &str) -> ParseResult {
    let mut line_items = Vec::new();
    for line in text.lines().skip(1) {
        let cols: Vec<&str> = line.split(',').collect();
        if cols.len() < 4 {
            continue;
        }
        let quantity: i64 = cols[2].trim().parse().unwrap_or(1);
        let price: f64 = cols[3].trim().parse().unwrap_or(0.0);
        line_items.push(json!({
            "sku": cols[0].trim(),
            "productName": cols[1].trim(),
            "quantity": quantity,
            "unitCost": price,
        }));
    }
    ParseResult { extracted_data: json!({ "lineItems": line_items }), confidence: 0.95 }
}

pub struct DevShopifyClient;

#[async_trait]
impl ShopifyClient for DevShopifyClient {
    async fn sync_product_draft(&self, _draft: &Value) -> CapabilityResult<ShopifySyncResult> {
        Ok(ShopifySyncResult { product_id: Uuid::now_v7().to_string(), variant_id: Uuid::now_v7().to_string() })
    }
}

pub struct DevImageSearcher;

#[async_trait]
impl ImageSearcher for DevImageSearcher {
    async fn search(&self, _query: &str) -> CapabilityResult<Vec<String>> {
        Ok(Vec::new())
    }
}
