//! Per-principal request-budget enforcement (spec §4.4, C4).
//!
//! Primary path is an atomic increment against a KV store keyed by
//! `(principal, current 60-second window)`; when the KV store is
//! unavailable, an in-process sliding-window counter takes over with the
//! same limits. Callers may exceed the true global limit during a KV
//! outage — an accepted degradation (spec §4.4).

mod error;
mod kv;

pub use error::RateLimitError;
pub use kv::{FredKvStore, KvStore, KvUnavailable};

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst: u32,
}

impl RateLimitConfig {
    fn ceiling(&self) -> u64 {
        (self.requests_per_minute + self.burst) as u64
    }
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    pub limit: u32,
    pub reset_at_epoch_secs: i64,
}

struct LocalWindow {
    hits: VecDeque<i64>,
}

pub struct RateLimiter {
    kv: Option<Arc<dyn KvStore>>,
    local_windows: dashmap::DashMap<String, Arc<Mutex<LocalWindow>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, kv: Option<Arc<dyn KvStore>>) -> Self {
        Self {
            kv,
            local_windows: dashmap::DashMap::new(),
            config,
        }
    }

    /// Checks and consumes one unit of budget for `principal_id`. Callers
    /// must skip this entirely for principals that bypass rate limiting
    /// (admins — spec §4.4, §9 open question), since this function always
    /// consumes a unit when invoked.
    pub async fn check(&self, principal_id: &str) -> Decision {
        if let Some(kv) = &self.kv {
            let window = Utc::now().timestamp() / 60;
            let key = format!("ratelimit:{principal_id}:{window}");
            match kv.incr_with_ttl(&key, Duration::from_secs(60)).await {
                Ok(count) => return self.decide(count, window),
                Err(_) => {
                    tracing::warn!(principal_id, "kv store unavailable, falling back to in-process rate limiting");
                }
            }
        }
        self.check_local(principal_id).await
    }

    fn decide(&self, count: u64, window: i64) -> Decision {
        let ceiling = self.config.ceiling();
        let reset_at_epoch_secs = (window + 1) * 60;
        Decision {
            allowed: count <= ceiling,
            remaining: ceiling.saturating_sub(count) as u32,
            limit: self.config.requests_per_minute,
            reset_at_epoch_secs,
        }
    }

    async fn check_local(&self, principal_id: &str) -> Decision {
        let window = self
            .local_windows
            .entry(principal_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(LocalWindow { hits: VecDeque::new() })))
            .clone();

        let mut window = window.lock().await;
        let now = Utc::now().timestamp();
        while window.hits.front().is_some_and(|&t| now - t >= 60) {
            window.hits.pop_front();
        }
        window.hits.push_back(now);

        let ceiling = self.config.ceiling();
        let count = window.hits.len() as u64;
        let reset_at_epoch_secs = window.hits.front().copied().unwrap_or(now) + 60;
        Decision {
            allowed: count <= ceiling,
            remaining: ceiling.saturating_sub(count) as u32,
            limit: self.config.requests_per_minute,
            reset_at_epoch_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubKv {
        counts: dashmap::DashMap<String, u64>,
        fail: AtomicBool,
    }

    #[async_trait::async_trait]
    impl KvStore for StubKv {
        async fn incr_with_ttl(&self, key: &str, _ttl: Duration) -> Result<u64, KvUnavailable> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(KvUnavailable);
            }
            let mut entry = self.counts.entry(key.to_string()).or_insert(0);
            *entry += 1;
            Ok(*entry)
        }
    }

    fn config(rpm: u32, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: rpm,
            burst,
        }
    }

    #[tokio::test]
    async fn allows_up_to_limit_plus_burst_then_rejects() {
        let kv = Arc::new(StubKv {
            counts: dashmap::DashMap::new(),
            fail: AtomicBool::new(false),
        });
        let limiter = RateLimiter::new(config(2, 0), Some(kv));

        let d1 = limiter.check("u1").await;
        let d2 = limiter.check("u1").await;
        let d3 = limiter.check("u1").await;

        assert!(d1.allowed);
        assert!(d2.allowed);
        assert!(!d3.allowed);
    }

    #[tokio::test]
    async fn falls_back_to_local_when_kv_unavailable() {
        let kv = Arc::new(StubKv {
            counts: dashmap::DashMap::new(),
            fail: AtomicBool::new(true),
        });
        let limiter = RateLimiter::new(config(2, 0), Some(kv));

        let d1 = limiter.check("u1").await;
        let d2 = limiter.check("u1").await;
        let d3 = limiter.check("u1").await;

        assert!(d1.allowed);
        assert!(d2.allowed);
        assert!(!d3.allowed);
    }

    #[tokio::test]
    async fn no_kv_configured_uses_local_path_directly() {
        let limiter = RateLimiter::new(config(1, 1), None);
        let d1 = limiter.check("u1").await;
        let d2 = limiter.check("u1").await;
        let d3 = limiter.check("u1").await;

        assert!(d1.allowed);
        assert!(d2.allowed);
        assert!(!d3.allowed);
    }

    #[tokio::test]
    async fn separate_principals_have_independent_budgets() {
        let limiter = RateLimiter::new(config(1, 0), None);
        let d1 = limiter.check("u1").await;
        let d2 = limiter.check("u2").await;
        assert!(d1.allowed);
        assert!(d2.allowed);
    }
}
