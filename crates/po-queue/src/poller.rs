//! Adaptive poll backoff, adapted from the teacher's
//! `everruns_durable::worker::poller::AdaptivePoller`: when a queue has been
//! empty for consecutive polls, back off toward `max_interval`; any non-empty
//! poll resets to `min_interval` so a burst of work is picked up promptly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub backoff_multiplier: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(50),
            max_interval: Duration::from_secs(5),
            backoff_multiplier: 1.5,
        }
    }
}

pub struct AdaptivePoller {
    config: PollerConfig,
    current_interval_ms: AtomicU64,
}

impl AdaptivePoller {
    pub fn new(config: PollerConfig) -> Self {
        let start = config.min_interval.as_millis() as u64;
        Self { config, current_interval_ms: AtomicU64::new(start) }
    }

    pub fn current_interval(&self) -> Duration {
        Duration::from_millis(self.current_interval_ms.load(Ordering::Relaxed))
    }

    pub fn reset_backoff(&self) {
        self.current_interval_ms
            .store(self.config.min_interval.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn increase_backoff(&self) {
        let current = self.current_interval_ms.load(Ordering::Relaxed);
        let next = ((current as f64) * self.config.backoff_multiplier) as u64;
        let capped = next.min(self.config.max_interval.as_millis() as u64);
        self.current_interval_ms.store(capped, Ordering::Relaxed);
    }

    pub async fn wait(&self) {
        tokio::time::sleep(self.current_interval()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_toward_the_ceiling() {
        let poller = AdaptivePoller::new(PollerConfig {
            min_interval: Duration::from_millis(50),
            max_interval: Duration::from_millis(200),
            backoff_multiplier: 2.0,
        });
        assert_eq!(poller.current_interval(), Duration::from_millis(50));
        poller.increase_backoff();
        assert_eq!(poller.current_interval(), Duration::from_millis(100));
        poller.increase_backoff();
        assert_eq!(poller.current_interval(), Duration::from_millis(200));
        poller.increase_backoff();
        assert_eq!(poller.current_interval(), Duration::from_millis(200));
    }

    #[test]
    fn reset_drops_back_to_minimum() {
        let poller = AdaptivePoller::new(PollerConfig::default());
        poller.increase_backoff();
        poller.increase_backoff();
        poller.reset_backoff();
        assert_eq!(poller.current_interval(), poller.config.min_interval);
    }
}
