//! Job envelope and enqueue options (spec.md §4.2).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `opts` passed to `Enqueue` (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    pub delay: Duration,
    pub priority: i32,
    pub attempts: u32,
    pub backoff_initial: Duration,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            priority: 0,
            attempts: 3,
            backoff_initial: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub attempt: u32,
    pub max_attempts: u32,
    pub backoff_initial_ms: u64,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    /// Redis sorted-set score: higher `priority` sorts first, ties broken by
    /// enqueue order (FIFO within a priority, spec.md §4.2).
    pub fn score(&self) -> f64 {
        const PRIORITY_WEIGHT: f64 = 1e13;
        -(self.priority as f64) * PRIORITY_WEIGHT + self.enqueued_at.timestamp_millis() as f64
    }

    pub fn next_backoff(&self) -> Duration {
        let exp = 2u32.saturating_pow(self.attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_initial_ms.saturating_mul(exp as u64))
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(priority: i32, millis_offset: i64) -> Job {
        Job {
            id: JobId::new(),
            queue: "ai_parsing".into(),
            payload: serde_json::json!({}),
            priority,
            attempt: 0,
            max_attempts: 3,
            backoff_initial_ms: 1000,
            enqueued_at: Utc::now() + chrono::Duration::milliseconds(millis_offset),
        }
    }

    #[test]
    fn higher_priority_sorts_first() {
        let low = sample(0, 0);
        let high = sample(10, 0);
        assert!(high.score() < low.score());
    }

    #[test]
    fn same_priority_is_fifo() {
        let earlier = sample(0, 0);
        let later = sample(0, 1000);
        assert!(earlier.score() < later.score());
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let mut job = sample(0, 0);
        job.attempt = 1;
        let first = job.next_backoff();
        job.attempt = 2;
        let second = job.next_backoff();
        assert_eq!(second, first * 2);
    }
}
