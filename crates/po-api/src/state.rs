//! Shared app state, grounded on the teacher's `AppState { db: Arc<Database>
//! }` convention (`control-plane::main::AppState`), widened to the other
//! collaborators this surface needs.

use std::sync::Arc;

use po_db::Gateway;
use po_orchestrator::Orchestrator;
use po_queue::QueueRuntime;
use po_runtime::{RedisProgressPublisher, StageResultStore};

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub queue: Arc<QueueRuntime>,
    pub stage_store: Arc<dyn StageResultStore>,
    pub progress: Arc<RedisProgressPublisher>,
    pub orchestrator: Arc<Orchestrator>,
}
