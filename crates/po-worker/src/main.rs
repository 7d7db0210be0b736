//! Binary entrypoint for the queue workers and the Cron Reconciler.
//!
//! Grounded on the teacher's `everruns-worker::main` wiring (telemetry init,
//! config-from-env, spawn the work loop, wait on `ctrl_c` for shutdown) but
//! adapted from a single gRPC worker loop to `po_queue::QueueRuntime`'s
//! per-queue `register` model: one `tokio::spawn`ed poll loop per stage
//! queue rather than one long-lived `worker.run()` future.

mod capabilities;
mod stages;

use std::sync::Arc;

use po_db::Gateway;
use po_orchestrator::Orchestrator;
use po_persistence::PersistenceService;
use po_queue::QueueRuntime;
use po_reconciler::Reconciler;
use po_runtime::{RedisProgressPublisher, StageResultStore};
use po_types::{Settings, StageName};
use redis::aio::ConnectionManager;

use capabilities::{DevAIParser, DevImageSearcher, DevShopifyClient};
use stages::StageContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "po_worker=info".into()))
        .init();

    tracing::info!("po-worker starting");

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

    let orchestrator = Arc::new(Orchestrator::new(gateway.clone(), stage_store, progress, queue.clone()));

    let persistence = Arc::new(PersistenceService::new(gateway.clone()));

    let ctx = Arc::new(StageContext {
        gateway: gateway.clone(),
        queue: queue.clone(),
        persistence,
        ai_parser: Arc::new(DevAIParser),
        shopify_client: Arc::new(DevShopifyClient),
        image_searcher: Arc::new(DevImageSearcher),
        async_image_processing: settings.async_image_processing,
    });

    for stage in StageName::ORDER {
        queue.register(
            stage.queue_name(),
            po_queue::default_concurrency(stage.queue_name()),
            stage.stall_timeout(),
            stages::handler_for(stage, ctx.clone(), orchestrator.clone()),
        );
        tracing::info!(queue = stage.queue_name(), "registered stage handler");
    }

    queue.register(
        po_types::stage::BACKGROUND_IMAGE_PROCESSING_QUEUE,
        po_queue::default_concurrency(po_types::stage::BACKGROUND_IMAGE_PROCESSING_QUEUE),
        std::time::Duration::from_secs(120),
        stages::background_image_processing_handler(ctx.clone()),
    );
    tracing::info!(queue = po_types::stage::BACKGROUND_IMAGE_PROCESSING_QUEUE, "registered background handler");

    let reconciler = Arc::new(Reconciler::new(gateway, queue));
    reconciler.spawn_loop(settings.reconciler_interval, settings.reconciler_startup_delay);
    tracing::info!("reconciler loop scheduled");

    tokio::signal::ctrl_c().await?;
    tracing::info!("received shutdown signal, exiting");

    Ok(())
}
