//! The fixed named queues (spec.md §4.2). `Enqueue`/`Register` reject any
//! other name with `QueueError::UnknownQueue` — the queue set is closed, not
//! discovered at runtime.

pub const QUEUE_NAMES: [&str; 11] = [
    "ai_parsing",
    "database_save",
    "product_draft_creation",
    "image_attachment",
    "background_image_processing",
    "shopify_sync",
    "status_update",
    "data_normalization",
    "merchant_config",
    "ai_enrichment",
    "shopify_payload",
];

pub fn is_known_queue(name: &str) -> bool {
    QUEUE_NAMES.contains(&name)
}

/// Declared concurrency for a queue absent an explicit override passed to
/// `Register` (spec.md §4.2: "typical 1-5; background_image_processing =
/// 1").
pub fn default_concurrency(name: &str) -> u32 {
    if name == "background_image_processing" {
        1
    } else {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_image_processing_defaults_to_one() {
        assert_eq!(default_concurrency("background_image_processing"), 1);
    }

    #[test]
    fn unknown_queue_is_rejected() {
        assert!(!is_known_queue("not_a_real_queue"));
    }

    #[test]
    fn all_fixed_queues_are_known() {
        for name in QUEUE_NAMES {
            assert!(is_known_queue(name));
        }
    }
}
