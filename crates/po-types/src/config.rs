//! Environment-driven configuration (spec.md §6 environment table).
//!
//! No config framework beyond `std::env`, matching the teacher's
//! `RunnerConfig::from_env()` / `AuthConfig::from_env()` convention — every
//! option has a typed default so a bare `docker run` with no environment
//! still starts.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Pooled ("runtime") Postgres connection string.
    pub database_url: String,
    /// Direct Postgres connection string used only by the Reconciler.
    pub database_direct_url: String,
    /// Redis broker URL backing the Queue Runtime, Stage Result Store and
    /// Progress Bus.
    pub queue_broker_url: String,

    pub connection_pool_size: u32,
    pub connection_max_age: Duration,
    pub db_warmup_window: Duration,
    pub db_warmup_ceiling: Duration,

    pub reconciler_interval: Duration,
    pub reconciler_startup_delay: Duration,
    pub reconciler_stall_threshold: chrono::Duration,

    pub po_lock_lease: Duration,
    pub po_lock_max_wait: Duration,
    pub po_lock_poll_interval: Duration,

    pub stage_result_ttl: Duration,

    /// spec.md §9 "default to asynchronous" image processing.
    pub async_image_processing: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            database_url: env_string("DATABASE_URL", "postgres://localhost/po_workflow"),
            database_direct_url: env_string("DATABASE_DIRECT_URL", "postgres://localhost/po_workflow"),
            queue_broker_url: env_string("QUEUE_BROKER_URL", "redis://localhost:6379"),

            connection_pool_size: env_parsed("DB_POOL_SIZE", 5),
            connection_max_age: Duration::from_millis(env_parsed("DB_CONNECTION_MAX_AGE_MS", 300_000)),
            db_warmup_window: Duration::from_millis(env_parsed("DB_WARMUP_WINDOW_MS", 2_500)),
            db_warmup_ceiling: Duration::from_millis(env_parsed("DB_WARMUP_CEILING_MS", 10_000)),

            reconciler_interval: Duration::from_millis(env_parsed("RECONCILER_INTERVAL_MS", 60_000)),
            reconciler_startup_delay: Duration::from_millis(env_parsed("RECONCILER_STARTUP_DELAY_MS", 3_000)),
            reconciler_stall_threshold: chrono::Duration::minutes(env_parsed("RECONCILER_STALL_THRESHOLD_MIN", 5)),

            po_lock_lease: Duration::from_millis(env_parsed("PO_LOCK_LEASE_MS", 60_000)),
            po_lock_max_wait: Duration::from_millis(env_parsed("PO_LOCK_MAX_WAIT_MS", 15_000)),
            po_lock_poll_interval: Duration::from_millis(env_parsed("PO_LOCK_POLL_INTERVAL_MS", 300)),

            stage_result_ttl: Duration::from_secs(env_parsed("STAGE_RESULT_TTL_SECS", 30 * 60)),

            async_image_processing: env_bool("ASYNC_IMAGE_PROCESSING", true),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        // Isolated from the process environment: construct directly rather
        // than mutating std::env, since tests run concurrently.
        let settings = Settings {
            database_url: "postgres://x".into(),
            database_direct_url: "postgres://x".into(),
            queue_broker_url: "redis://x".into(),
            connection_pool_size: 5,
            connection_max_age: Duration::from_millis(300_000),
            db_warmup_window: Duration::from_millis(2_500),
            db_warmup_ceiling: Duration::from_millis(10_000),
            reconciler_interval: Duration::from_millis(60_000),
            reconciler_startup_delay: Duration::from_millis(3_000),
            reconciler_stall_threshold: chrono::Duration::minutes(5),
            po_lock_lease: Duration::from_millis(60_000),
            po_lock_max_wait: Duration::from_millis(15_000),
            po_lock_poll_interval: Duration::from_millis(300),
            stage_result_ttl: Duration::from_secs(1800),
            async_image_processing: true,
        };
        assert_eq!(settings.connection_pool_size, 5);
        assert!(settings.async_image_processing);
        assert_eq!(settings.db_warmup_ceiling, Duration::from_secs(10));
    }
}
