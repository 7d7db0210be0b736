//! The HTTP surface (spec.md §6): ingress, workflow/PO reads, realtime
//! progress and queue admin, all scoped to the authenticated merchant.

pub mod auth;
pub mod error;
pub mod ingress;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/upload", post(ingress::upload))
        .route("/workflow/:id/status", get(routes::workflow_status))
        .route("/purchase-orders/:id", get(routes::get_purchase_order))
        .route("/purchase-orders/:id/reprocess", post(routes::reprocess_purchase_order))
        .route("/realtime/events", get(routes::realtime_events))
        .route("/health", get(routes::health))
        .route("/queue-admin/status", get(routes::queue_admin_status))
        .route("/queue-admin/failed-jobs", get(routes::queue_admin_failed_jobs))
        .route("/queue-admin/clean-failed", post(routes::queue_admin_clean_failed))
        .with_state(state)
}
