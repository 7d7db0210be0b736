//! The fixed stage DAG (spec.md §4.6).
//!
//! The pipeline is linear and deterministic, so the whole DAG lives as one
//! enum with a `next()` function rather than a generic graph structure —
//! there is exactly one path through it and no workflow DSL is in scope.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    AiParsing,
    DatabaseSave,
    DataNormalization,
    MerchantConfig,
    AiEnrichment,
    ShopifyPayload,
    ProductDraftCreation,
    ImageAttachment,
    ShopifySync,
    StatusUpdate,
}

/// Background stage enqueued by `image_attachment` in async mode; it is not
/// part of the linear workflow DAG (the workflow advances past it
/// immediately) but is still a named queue per spec.md §4.2.
pub const BACKGROUND_IMAGE_PROCESSING_QUEUE: &str = "background_image_processing";

impl StageName {
    pub const ORDER: [StageName; 10] = [
        StageName::AiParsing,
        StageName::DatabaseSave,
        StageName::DataNormalization,
        StageName::MerchantConfig,
        StageName::AiEnrichment,
        StageName::ShopifyPayload,
        StageName::ProductDraftCreation,
        StageName::ImageAttachment,
        StageName::ShopifySync,
        StageName::StatusUpdate,
    ];

    pub fn first() -> StageName {
        Self::ORDER[0]
    }

    pub fn index(&self) -> usize {
        Self::ORDER.iter().position(|s| s == self).expect("stage is in ORDER")
    }

    /// Next stage in the DAG, or `None` if this is the terminal stage.
    pub fn next(&self) -> Option<StageName> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    /// Percentage complete once this stage has finished (spec.md
    /// `WorkflowExecution.progressPercent`).
    pub fn progress_percent_after(&self) -> u8 {
        let completed = self.index() + 1;
        ((completed * 100) / Self::ORDER.len()) as u8
    }

    /// Stages that mutate PO state and therefore must hold the PO lock for
    /// the duration of their transaction (spec.md §4.5 rule 1).
    pub fn mutates_po(&self) -> bool {
        matches!(self, StageName::DatabaseSave | StageName::StatusUpdate)
    }

    /// Queue name this stage is dispatched on. Matches the fixed queue list
    /// in spec.md §4.2 verbatim.
    pub fn queue_name(&self) -> &'static str {
        match self {
            StageName::AiParsing => "ai_parsing",
            StageName::DatabaseSave => "database_save",
            StageName::DataNormalization => "data_normalization",
            StageName::MerchantConfig => "merchant_config",
            StageName::AiEnrichment => "ai_enrichment",
            StageName::ShopifyPayload => "shopify_payload",
            StageName::ProductDraftCreation => "product_draft_creation",
            StageName::ImageAttachment => "image_attachment",
            StageName::ShopifySync => "shopify_sync",
            StageName::StatusUpdate => "status_update",
        }
    }

    pub fn from_queue_name(queue: &str) -> Option<StageName> {
        Self::ORDER.into_iter().find(|s| s.queue_name() == queue)
    }

    /// Stall timeout before an in-flight job is considered abandoned and
    /// returned to the queue (spec.md §4.2, §5). AI stages get a longer
    /// ceiling because the external parser call can be slow.
    pub fn stall_timeout(&self) -> std::time::Duration {
        use std::time::Duration;
        match self {
            StageName::AiParsing | StageName::AiEnrichment => Duration::from_secs(180),
            StageName::ShopifySync | StageName::ProductDraftCreation => Duration::from_secs(90),
            _ => Duration::from_secs(60),
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.queue_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dag_is_linear_and_terminates() {
        let mut stage = StageName::first();
        let mut seen = 1;
        while let Some(next) = stage.next() {
            stage = next;
            seen += 1;
        }
        assert_eq!(stage, StageName::StatusUpdate);
        assert_eq!(seen, StageName::ORDER.len());
    }

    #[test]
    fn progress_percent_monotonic() {
        let mut last = 0u8;
        for stage in StageName::ORDER {
            let pct = stage.progress_percent_after();
            assert!(pct >= last);
            last = pct;
        }
        assert_eq!(StageName::StatusUpdate.progress_percent_after(), 100);
    }

    #[test]
    fn queue_name_round_trips() {
        for stage in StageName::ORDER {
            assert_eq!(StageName::from_queue_name(stage.queue_name()), Some(stage));
        }
        assert_eq!(StageName::from_queue_name("not_a_queue"), None);
    }
}
