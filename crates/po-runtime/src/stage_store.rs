//! Stage Result Store (spec.md §4.3): ephemeral key/value state keyed by
//! workflow id, TTL ~30 min, with a shallow-merged accumulator.
//!
//! Two implementations mirror the teacher's split of
//! `PostgresWorkflowEventStore` / in-memory test double: `RedisStageResultStore`
//! for production, `InMemoryStageResultStore` for tests that shouldn't need a
//! live broker.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;

use po_types::{StageName, WorkflowId};

use crate::error::{RuntimeError, RuntimeResult};

#[async_trait]
pub trait StageResultStore: Send + Sync {
    async fn save_stage_result(&self, workflow_id: &WorkflowId, stage: StageName, payload: Value) -> RuntimeResult<()>;
    async fn get_stage_result(&self, workflow_id: &WorkflowId, stage: StageName) -> RuntimeResult<Option<Value>>;
    /// Falls back to an empty object if the accumulator has expired or was
    /// never written; the Orchestrator is responsible for then rehydrating
    /// from durable PO state (spec.md §4.3, §4.6 step 1).
    async fn get_accumulated_data(&self, workflow_id: &WorkflowId) -> RuntimeResult<Value>;
}

fn stage_key(workflow_id: &WorkflowId, stage: StageName) -> String {
    format!("workflow:{workflow_id}:{stage}")
}

fn acc_key(workflow_id: &WorkflowId) -> String {
    format!("workflow:{workflow_id}:acc")
}

/// Shallow last-write-wins merge of two JSON objects (spec.md §5).
fn merge(base: &mut Value, incoming: &Value) {
    if let (Some(base_map), Value::Object(incoming_map)) = (base.as_object_mut(), incoming) {
        for (k, v) in incoming_map {
            base_map.insert(k.clone(), v.clone());
        }
    }
}

pub struct RedisStageResultStore {
    manager: ConnectionManager,
    ttl: Duration,
}

impl RedisStageResultStore {
    pub fn new(manager: ConnectionManager, ttl: Duration) -> Self {
        Self { manager, ttl }
    }
}

#[async_trait]
impl StageResultStore for RedisStageResultStore {
    async fn save_stage_result(&self, workflow_id: &WorkflowId, stage: StageName, payload: Value) -> RuntimeResult<()> {
        let mut conn = self.manager.clone();
        let ttl_secs = self.ttl.as_secs();

        let _: () = conn
            .set_ex(stage_key(workflow_id, stage), serde_json::to_string(&payload)?, ttl_secs)
            .await?;

        let existing: Option<String> = conn.get(acc_key(workflow_id)).await?;
        let mut acc = match existing {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Value::Object(Default::default()),
        };
        merge(&mut acc, &payload);
        let _: () = conn.set_ex(acc_key(workflow_id), serde_json::to_string(&acc)?, ttl_secs).await?;
        Ok(())
    }

    async fn get_stage_result(&self, workflow_id: &WorkflowId, stage: StageName) -> RuntimeResult<Option<Value>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(stage_key(workflow_id, stage)).await?;
        Ok(raw.map(|r| serde_json::from_str(&r)).transpose()?)
    }

    async fn get_accumulated_data(&self, workflow_id: &WorkflowId) -> RuntimeResult<Value> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(acc_key(workflow_id)).await?;
        Ok(match raw {
            Some(r) => serde_json::from_str(&r)?,
            None => Value::Object(Default::default()),
        })
    }
}

struct Entry {
    value: Value,
    expires_at: Instant,
}

pub struct InMemoryStageResultStore {
    stages: Mutex<HashMap<String, Entry>>,
    acc: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl InMemoryStageResultStore {
    pub fn new(ttl: Duration) -> Self {
        Self { stages: Mutex::new(HashMap::new()), acc: Mutex::new(HashMap::new()), ttl }
    }

    fn live(entry: &Entry) -> bool {
        entry.expires_at > Instant::now()
    }
}

impl Default for InMemoryStageResultStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 60))
    }
}

#[async_trait]
impl StageResultStore for InMemoryStageResultStore {
    async fn save_stage_result(&self, workflow_id: &WorkflowId, stage: StageName, payload: Value) -> RuntimeResult<()> {
        let expires_at = Instant::now() + self.ttl;
        self.stages.lock().unwrap().insert(
            stage_key(workflow_id, stage),
            Entry { value: payload.clone(), expires_at },
        );

        let mut acc_guard = self.acc.lock().unwrap();
        let key = acc_key(workflow_id);
        let mut acc = acc_guard
            .get(&key)
            .filter(|e| Self::live(e))
            .map(|e| e.value.clone())
            .unwrap_or_else(|| Value::Object(Default::default()));
        merge(&mut acc, &payload);
        acc_guard.insert(key, Entry { value: acc, expires_at });
        Ok(())
    }

    async fn get_stage_result(&self, workflow_id: &WorkflowId, stage: StageName) -> RuntimeResult<Option<Value>> {
        Ok(self
            .stages
            .lock()
            .unwrap()
            .get(&stage_key(workflow_id, stage))
            .filter(|e| Self::live(e))
            .map(|e| e.value.clone()))
    }

    async fn get_accumulated_data(&self, workflow_id: &WorkflowId) -> RuntimeResult<Value> {
        Ok(self
            .acc
            .lock()
            .unwrap()
            .get(&acc_key(workflow_id))
            .filter(|e| Self::live(e))
            .map(|e| e.value.clone())
            .unwrap_or_else(|| Value::Object(Default::default())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn accumulator_merges_last_write_wins() {
        let store = InMemoryStageResultStore::default();
        let wf = WorkflowId::new();
        store.save_stage_result(&wf, StageName::AiParsing, json!({"a": 1, "b": 1})).await.unwrap();
        store.save_stage_result(&wf, StageName::DatabaseSave, json!({"b": 2, "c": 3})).await.unwrap();

        let acc = store.get_accumulated_data(&wf).await.unwrap();
        assert_eq!(acc, json!({"a": 1, "b": 2, "c": 3}));
    }

    #[tokio::test]
    async fn missing_accumulator_defaults_to_empty_object() {
        let store = InMemoryStageResultStore::default();
        let wf = WorkflowId::new();
        assert_eq!(store.get_accumulated_data(&wf).await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        let store = InMemoryStageResultStore::new(Duration::from_millis(1));
        let wf = WorkflowId::new();
        store.save_stage_result(&wf, StageName::AiParsing, json!({"a": 1})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get_stage_result(&wf, StageName::AiParsing).await.unwrap(), None);
        assert_eq!(store.get_accumulated_data(&wf).await.unwrap(), json!({}));
    }
}
