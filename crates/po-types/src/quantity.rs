//! Quantity inference from a product name when the AI result didn't supply
//! one (spec.md §4.9 step 3, testable property 5).
//!
//! Patterns recognized: `Case of 12`, `24 ct`, `6-Pack` / `6 Pack`,
//! `18 count`. Anything that matches none of them defaults to 1.

use std::sync::OnceLock;

use regex::Regex;

struct Patterns {
    case_of: Regex,
    count_abbrev: Regex,
    pack: Regex,
    count_word: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        case_of: Regex::new(r"(?i)case\s+of\s+(\d+)").unwrap(),
        count_abbrev: Regex::new(r"(?i)(\d+)\s*ct\b").unwrap(),
        pack: Regex::new(r"(?i)(\d+)[\s-]*pack\b").unwrap(),
        count_word: Regex::new(r"(?i)(\d+)\s*count\b").unwrap(),
    })
}

/// Returns the first matching pattern's quantity, or `1` if none match.
pub fn parse_quantity(product_name: &str) -> i32 {
    let p = patterns();
    for re in [&p.case_of, &p.count_abbrev, &p.pack, &p.count_word] {
        if let Some(caps) = re.captures(product_name) {
            if let Ok(n) = caps[1].parse::<i32>() {
                if n > 0 {
                    return n;
                }
            }
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_of_pattern() {
        assert_eq!(
            parse_quantity("Kool Aid Soda Blue Raspberry 355 ml - Case of 12"),
            12
        );
    }

    #[test]
    fn count_abbreviation() {
        assert_eq!(parse_quantity("Widget 24 ct"), 24);
    }

    #[test]
    fn hyphenated_pack() {
        assert_eq!(parse_quantity("Energy Bar 6-Pack"), 6);
    }

    #[test]
    fn spaced_pack() {
        assert_eq!(parse_quantity("Energy Bar 6 Pack"), 6);
    }

    #[test]
    fn count_word() {
        assert_eq!(parse_quantity("Bandages 18 count"), 18);
    }

    #[test]
    fn default_single() {
        assert_eq!(parse_quantity("Single Candy Bar"), 1);
    }

    #[test]
    fn zero_quantity_pattern_falls_back_to_default() {
        assert_eq!(parse_quantity("Case of 0 Widgets"), 1);
    }
}
