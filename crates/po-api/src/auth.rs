//! Principal resolution (spec.md §7): "session missing/expired → 401 at the
//! HTTP boundary; never retried internally" and "every query must be
//! filtered by merchantId derived from the authenticated principal ...
//! The core accepts no merchantId from request bodies."
//!
//! Session/auth middleware itself is an external collaborator out of scope
//! here (spec.md §5); this extractor only defines the boundary a real auth
//! layer plugs into, grounded on the teacher's `AuthUser` bearer-token
//! extractor (`control-plane::auth::middleware::extract_auth_user`) reduced
//! to merchant-session resolution.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use po_types::{Merchant, MerchantId};
use serde_json::json;
use sqlx::Row;

use crate::state::AppState;

pub struct AuthError;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "authentication required" }))).into_response()
    }
}

/// The authenticated merchant for the current request. Every handler that
/// touches merchant-scoped data takes this instead of reading a merchant id
/// out of the body or query string.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedMerchant(pub MerchantId);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthenticatedMerchant {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session_token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AuthError)?;

        let merchant_id = resolve_session(state, session_token).await.ok_or(AuthError)?;
        Ok(AuthenticatedMerchant(merchant_id))
    }
}

/// spec.md §6: `/realtime/events` takes a `shop` query parameter instead of
/// a bearer token, because `EventSource` cannot send custom headers; the
/// shop domain is still resolved against the merchants table rather than
/// trusted as-is.
pub async fn resolve_shop(state: &AppState, shop_domain: &str) -> Option<Merchant> {
    let pool = match state.gateway.client().await {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(%err, "failed to resolve shop: gateway not ready");
            return None;
        }
    };
    let row = sqlx::query("SELECT id, shop_domain, status, settings FROM merchants WHERE shop_domain = $1")
        .bind(shop_domain)
        .fetch_optional(pool)
        .await
        .ok()
        .flatten()?;

    let status: String = row.get("status");
    let merchant = Merchant {
        id: MerchantId::from_uuid(row.get("id")),
        shop_domain: row.get("shop_domain"),
        status: if status == "active" { po_types::MerchantStatus::Active } else { po_types::MerchantStatus::Inactive },
        settings: row.get("settings"),
    };
    if merchant.is_active() {
        Some(merchant)
    } else {
        None
    }
}

/// Placeholder session resolution: a real deployment plugs a session store
/// or JWT verifier in here. We only require that whatever comes back is an
/// active merchant, so the lookup path matches `resolve_shop` above.
async fn resolve_session(state: &AppState, session_token: &str) -> Option<MerchantId> {
    let pool = state.gateway.client().await.ok()?;
    let merchant_id = uuid::Uuid::parse_str(session_token).ok()?;
    let row = sqlx::query("SELECT status FROM merchants WHERE id = $1")
        .bind(merchant_id)
        .fetch_optional(pool)
        .await
        .ok()
        .flatten()?;
    let status: String = row.get("status");
    if status == "active" {
        Some(MerchantId::from_uuid(merchant_id))
    } else {
        None
    }
}
