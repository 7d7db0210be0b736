//! Progress Bus (spec.md §4.4): publish-only fan-out keyed by merchant id.
//!
//! Modeled on the teacher's `EventEmitter` trait / `DbEventEmitter`
//! (`everruns_core`/`control-plane::storage::event_emitter`), but write-only
//! and fire-and-forget: a publish failure is logged and swallowed, never
//! propagated to the stage that triggered it (spec.md §8 testable property
//! 9).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::warn;

use po_types::{MerchantId, ProgressPublisher};

/// The four fixed channel suffixes (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressChannel {
    Progress,
    Stage,
    Completion,
    Error,
}

impl ProgressChannel {
    fn suffix(&self) -> &'static str {
        match self {
            ProgressChannel::Progress => "progress",
            ProgressChannel::Stage => "stage",
            ProgressChannel::Completion => "completion",
            ProgressChannel::Error => "error",
        }
    }
}

pub fn channel_name(merchant_id: MerchantId, channel: ProgressChannel) -> String {
    format!("merchant:{merchant_id}:{}", channel.suffix())
}

pub struct RedisProgressPublisher {
    manager: ConnectionManager,
}

impl RedisProgressPublisher {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    pub async fn publish_to(&self, merchant_id: MerchantId, channel: ProgressChannel, event: &Value) {
        self.publish(&channel_name(merchant_id, channel), event).await;
    }
}

#[async_trait]
impl ProgressPublisher for RedisProgressPublisher {
    async fn publish(&self, channel: &str, event: &Value) {
        let mut conn = self.manager.clone();
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(err) => {
                warn!(%err, %channel, "failed to serialize progress event, dropping");
                return;
            }
        };
        if let Err(err) = conn.publish::<_, _, ()>(channel, payload).await {
            warn!(%err, %channel, "progress publish failed, swallowing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_match_the_fixed_suffixes() {
        let merchant = MerchantId::new();
        assert_eq!(channel_name(merchant, ProgressChannel::Progress), format!("merchant:{merchant}:progress"));
        assert_eq!(channel_name(merchant, ProgressChannel::Stage), format!("merchant:{merchant}:stage"));
        assert_eq!(channel_name(merchant, ProgressChannel::Completion), format!("merchant:{merchant}:completion"));
        assert_eq!(channel_name(merchant, ProgressChannel::Error), format!("merchant:{merchant}:error"));
    }
}
