//! Sliding-window rate limiter, keyed by caller key (and optionally
//! operation name). Backed by `DashMap<String, VecDeque<Instant>>` guarded
//! per-key, matching the pool and session store's preference for a
//! lock-free top-level map over one global mutex.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct RateLimiterConfig {
    pub window: Duration,
    pub max_requests: usize,
    pub sweep_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 60,
            sweep_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum RateLimitDecision {
    Admit,
    Deny { retry_after_ms: u64 },
}

pub struct RateLimiter {
    windows: DashMap<String, Mutex<VecDeque<Instant>>>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    fn key(caller_key: &str, operation: Option<&str>) -> String {
        match operation {
            Some(op) => format!("{caller_key}:{op}"),
            None => caller_key.to_string(),
        }
    }

    /// Check and, if admitted, record one request for `caller_key` (and
    /// optionally `operation`).
    pub fn check(&self, caller_key: &str, operation: Option<&str>) -> RateLimitDecision {
        let key = Self::key(caller_key, operation);
        let entry = self.windows.entry(key).or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut timestamps = entry.lock();

        let now = Instant::now();
        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) > self.config.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.config.max_requests {
            let oldest = *timestamps.front().expect("len >= max_requests > 0 implies non-empty");
            let elapsed = now.duration_since(oldest);
            let retry_after = self.config.window.saturating_sub(elapsed);
            return RateLimitDecision::Deny {
                retry_after_ms: retry_after.as_millis() as u64,
            };
        }

        timestamps.push_back(now);
        RateLimitDecision::Admit
    }

    /// Evict keys whose entire window has expired, bounding memory for a
    /// long-lived process.
    pub fn sweep(&self) {
        let now = Instant::now();
        let stale: Vec<String> = self
            .windows
            .iter()
            .filter(|entry| {
                let timestamps = entry.value().lock();
                timestamps
                    .back()
                    .map(|&last| now.duration_since(last) > self.config.window)
                    .unwrap_or(true)
            })
            .map(|entry| entry.key().clone())
            .collect();

        for key in &stale {
            self.windows.remove(key);
        }
        if !stale.is_empty() {
            debug!(evicted = stale.len(), "rate limiter swept stale keys");
        }
    }

    pub async fn run_sweep_loop(&self, token: CancellationToken) {
        let mut ticker = interval(self.config.sweep_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.sweep(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: usize) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            window: Duration::from_millis(50),
            max_requests: max,
            sweep_interval: Duration::from_secs(300),
        })
    }

    #[test]
    fn admits_up_to_the_limit_then_denies() {
        let limiter = limiter(2);
        assert!(matches!(limiter.check("caller", None), RateLimitDecision::Admit));
        assert!(matches!(limiter.check("caller", None), RateLimitDecision::Admit));
        assert!(matches!(limiter.check("caller", None), RateLimitDecision::Deny { .. }));
    }

    #[test]
    fn distinct_callers_have_independent_windows() {
        let limiter = limiter(1);
        assert!(matches!(limiter.check("a", None), RateLimitDecision::Admit));
        assert!(matches!(limiter.check("b", None), RateLimitDecision::Admit));
    }

    #[test]
    fn admits_again_after_window_elapses() {
        let limiter = limiter(1);
        assert!(matches!(limiter.check("caller", None), RateLimitDecision::Admit));
        std::thread::sleep(Duration::from_millis(60));
        assert!(matches!(limiter.check("caller", None), RateLimitDecision::Admit));
    }

    #[test]
    fn sweep_evicts_fully_expired_keys() {
        let limiter = limiter(5);
        limiter.check("caller", None);
        std::thread::sleep(Duration::from_millis(60));
        limiter.sweep();
        assert_eq!(limiter.windows.len(), 0);
    }
}
