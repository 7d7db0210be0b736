//! Outbound collaborator interfaces (spec.md §6 "Outbound" table).
//!
//! These are the pluggable capabilities the core calls out to — document
//! parsing, the Shopify HTTP client, image search, and the Progress Bus
//! publisher. `po-worker` wires in concrete or stub implementations at
//! start-up; nothing in `po-orchestrator` or `po-persistence` depends on a
//! concrete type, only on these traits, matching the teacher's
//! provider-trait-then-concrete-impl split (see `everruns-core`'s LLM
//! provider traits).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("collaborator timed out")]
    Timeout,
    #[error("collaborator rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("collaborator request failed: {0}")]
    Request(String),
    #[error("collaborator returned an unusable response: {0}")]
    InvalidResponse(String),
}

pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// AI document parser. One call per `ai_parsing` / `ai_enrichment` stage
/// invocation; the caller is responsible for aligning its own timeout with
/// the queue's stall timeout for that stage (spec.md §6).
#[async_trait]
pub trait AIParser: Send + Sync {
    async fn parse(
        &self,
        buffer: &[u8],
        mime_type: &str,
        ai_settings: &Value,
    ) -> CapabilityResult<ParseResult>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub extracted_data: Value,
    pub confidence: f64,
}

/// Shopify HTTP client. Network, rate-limited; the Orchestrator treats
/// `shopify_sync` as its own stage with its own retry budget rather than
/// retrying inside the client.
#[async_trait]
pub trait ShopifyClient: Send + Sync {
    async fn sync_product_draft(&self, draft: &Value) -> CapabilityResult<ShopifySyncResult>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopifySyncResult {
    pub product_id: String,
    pub variant_id: String,
}

/// Best-effort background image search, invoked from `image_attachment`.
#[async_trait]
pub trait ImageSearcher: Send + Sync {
    async fn search(&self, query: &str) -> CapabilityResult<Vec<String>>;
}

/// Fire-and-forget progress publisher (the Progress Bus). Implementations
/// must never surface a publish failure to the caller — log and swallow
/// (spec.md §8 testable property 9).
#[async_trait]
pub trait ProgressPublisher: Send + Sync {
    async fn publish(&self, channel: &str, event: &Value);
}
