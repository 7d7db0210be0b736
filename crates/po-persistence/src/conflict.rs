//! PO Number Conflict Resolution (spec.md §4.7).
//!
//! The uniqueness constraint is `(merchant_id, number)`. The UPDATE path
//! (an existing PO id carried by the Upload) always keeps the incumbent
//! number — the AI's proposed number change is dropped entirely rather than
//! retried, since retrying with the same dropped value is a no-op. The
//! CREATE path probes for the next free numeric suffix inside the same
//! transaction so the probe itself goes through the warmup gate.

use po_types::MerchantId;
use sqlx::{PgConnection, Postgres};

use crate::error::PersistenceResult;

/// UPDATE path: the number field is never taken from the AI result.
pub fn resolve_update_number(incumbent_number: &str) -> String {
    incumbent_number.to_string()
}

/// CREATE path: `base`, then `base-1` .. `base-10`, then `base-<epoch_ms>`.
pub async fn resolve_create_number(
    conn: &mut PgConnection,
    merchant_id: MerchantId,
    base: &str,
    now_millis: i64,
) -> PersistenceResult<String> {
    let like_pattern = format!("{base}-%");
    let existing: Vec<String> = sqlx::query_scalar::<Postgres, String>(
        "SELECT number FROM purchase_orders WHERE merchant_id = $1 AND (number = $2 OR number LIKE $3)",
    )
    .bind(merchant_id.as_uuid())
    .bind(base)
    .bind(&like_pattern)
    .fetch_all(conn)
    .await?;

    if !existing.iter().any(|n| n == base) {
        return Ok(base.to_string());
    }
    for suffix in 1..=10 {
        let candidate = format!("{base}-{suffix}");
        if !existing.iter().any(|n| n == &candidate) {
            return Ok(candidate);
        }
    }
    Ok(format!("{base}-{now_millis}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_path_always_keeps_the_incumbent() {
        assert_eq!(resolve_update_number("PO-1001"), "PO-1001");
    }
}
