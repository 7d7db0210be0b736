//! Binary entrypoint for the HTTP surface, grounded on the teacher's
//! `control-plane::main` wiring (telemetry init, DB connect, router
//! composition, CORS + trace layers, `axum::serve`).

use std::sync::Arc;

use po_api::{router, AppState};
use po_db::Gateway;
use po_orchestrator::Orchestrator;
use po_queue::QueueRuntime;
use po_runtime::{RedisProgressPublisher, StageResultStore};
use po_types::Settings;
use redis::aio::ConnectionManager;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "po_api=info,tower_http=info".into()))
        .init();

    tracing::info!("po-api starting");

    let settings = Settings::from_env();

    let gateway = Arc::new(Gateway::connect(&settings).await?);
    tracing::info!("database gateway warmed up");

    let queue = Arc::new(QueueRuntime::connect(&settings.queue_broker_url).await?);

    let redis_client = redis::Client::open(settings.queue_broker_url.as_str())?;
    let progress_manager = ConnectionManager::new(redis_client.clone()).await?;
    let progress = Arc::new(RedisProgressPublisher::new(progress_manager));

    let stage_store_manager = ConnectionManager::new(redis_client).await?;
    let stage_store: Arc<dyn StageResultStore> =
        Arc::new(po_runtime::RedisStageResultStore::new(stage_store_manager, settings.stage_result_ttl));

    let orchestrator = Arc::new(Orchestrator::new(gateway.clone(), stage_store.clone(), progress.clone(), queue.clone()));

    let state = AppState { gateway, queue, stage_store, progress, orchestrator };

    let app = router(state).layer(CorsLayer::permissive()).layer(TraceLayer::new_for_http());

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "po-api listening");
    axum::serve(listener, app).await?;

    Ok(())
}
