//! Deterministic SKU generation for line items missing one (spec.md §4.9).
//!
//! Line items are replaced wholesale on every persistence run, so the SKU
//! only needs to be deterministic and unique *within one PO's batch*, not
//! durable across runs.

pub fn generate_sku(product_name: &str, index: usize) -> String {
    let slug: String = product_name
        .to_uppercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let collapsed = slug.split('-').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("-");
    let truncated: String = collapsed.chars().take(24).collect();
    format!("{truncated}-{:03}", index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_appends_index() {
        assert_eq!(generate_sku("Kool Aid, Blue (355ml)", 0), "KOOL-AID-BLUE-355ML-001");
    }

    #[test]
    fn duplicate_names_within_a_batch_get_distinct_skus() {
        assert_ne!(generate_sku("Widget", 0), generate_sku("Widget", 1));
    }
}
