//! Fuzzy supplier matching (spec.md §4.9 "resolve/match supplier by fuzzy
//! lookup"). Jaro-Winkler via `strsim`, a standard ecosystem choice for
//! this problem and not a teacher dependency — imported per the
//! enrich-from-the-pack rule (see DESIGN.md).

use po_types::Supplier;

/// Below this similarity, no known supplier is considered a match and the
/// raw AI-extracted name is used as-is.
pub const MATCH_THRESHOLD: f64 = 0.88;

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Runs outside any transaction since it may be slow (spec.md §4.9).
pub fn find_best_match<'a>(candidates: &'a [Supplier], name: &str) -> Option<&'a Supplier> {
    let normalized = normalize_name(name);
    candidates
        .iter()
        .map(|s| (s, strsim::jaro_winkler(&s.normalized_name, &normalized)))
        .filter(|(_, score)| *score >= MATCH_THRESHOLD)
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(s, _)| s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use po_types::MerchantId;
    use uuid::Uuid;

    fn supplier(name: &str) -> Supplier {
        Supplier {
            id: po_types::SupplierId::from_uuid(Uuid::now_v7()),
            merchant_id: MerchantId::new(),
            name: name.to_string(),
            normalized_name: normalize_name(name),
        }
    }

    #[test]
    fn near_duplicate_names_match() {
        let candidates = vec![supplier("Acme Wholesale Foods"), supplier("Blue Ridge Distributors")];
        let found = find_best_match(&candidates, "Acme Wholesale Food").unwrap();
        assert_eq!(found.name, "Acme Wholesale Foods");
    }

    #[test]
    fn unrelated_name_does_not_match() {
        let candidates = vec![supplier("Acme Wholesale Foods")];
        assert!(find_best_match(&candidates, "Zephyr Industrial Supply").is_none());
    }
}
