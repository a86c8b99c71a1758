//! Generic three-state circuit breaker keyed by operation name (spec §4.5,
//! C5). Breakers are first-class values held in a [`BreakerRegistry`], not
//! global singletons (spec §9).

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_duration: Duration,
    pub half_open_permits: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration: Duration::from_secs(30),
            half_open_permits: 100,
        }
    }
}

#[derive(Debug)]
pub enum BreakerError<E> {
    /// Breaker is open; the operation was not attempted.
    Open { operation: String, retry_after_secs: u64 },
    /// Breaker is half-open and its concurrent-permit ceiling is exhausted.
    TooManyRequests { operation: String },
    /// The operation ran and returned an error.
    OperationFailed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerError::Open { operation, .. } => {
                write!(f, "circuit breaker open for operation {operation}")
            }
            BreakerError::TooManyRequests { operation } => {
                write!(f, "too many concurrent requests for operation {operation}")
            }
            BreakerError::OperationFailed(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for BreakerError<E> {}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<DateTime<Utc>>,
}

/// Invoked on every state transition; used to emit metrics.
pub type TransitionCallback = Arc<dyn Fn(&str, BreakerState, BreakerState) + Send + Sync>;

pub struct CircuitBreaker {
    operation: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    half_open_permits: Arc<Semaphore>,
    on_transition: Option<TransitionCallback>,
}

impl CircuitBreaker {
    pub fn new(operation: impl Into<String>, config: BreakerConfig) -> Self {
        Self::with_callback(operation, config, None)
    }

    pub fn with_callback(
        operation: impl Into<String>,
        config: BreakerConfig,
        on_transition: Option<TransitionCallback>,
    ) -> Self {
        let half_open_permits = Arc::new(Semaphore::new(config.half_open_permits as usize));
        Self {
            operation: operation.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
            half_open_permits,
            on_transition,
        }
    }

    pub async fn state(&self) -> BreakerState {
        self.inner.lock().await.state
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        if to == BreakerState::Open {
            inner.opened_at = Some(Utc::now());
        }
        tracing::info!(operation = %self.operation, from = ?from, to = ?to, "circuit breaker transition");
        if let Some(cb) = &self.on_transition {
            cb(&self.operation, from, to);
        }
    }

    /// Runs `op` under this breaker's admission policy (spec §4.5).
    ///
    /// `Err(E)` from `op` always increments the failure counter — this
    /// crate does not distinguish transport failures from caller-side
    /// errors; call sites are responsible for not routing pure validation
    /// errors through a breaker-guarded call (spec §9 open question).
    pub async fn run<F, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        // Held for the duration of the operation when admitted through the
        // half-open path, so the permit ceiling bounds real concurrency,
        // not just the admission check.
        let _half_open_permit: Option<tokio::sync::OwnedSemaphorePermit> = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                BreakerState::Closed => None,
                BreakerState::Open => {
                    let opened_at = inner.opened_at.unwrap_or_else(Utc::now);
                    let elapsed = Utc::now() - opened_at;
                    if elapsed
                        >= chrono::Duration::from_std(self.config.open_duration)
                            .unwrap_or_default()
                    {
                        self.transition(&mut inner, BreakerState::HalfOpen);
                        match self.half_open_permits.clone().try_acquire_owned() {
                            Ok(permit) => Some(permit),
                            Err(_) => {
                                return Err(BreakerError::TooManyRequests {
                                    operation: self.operation.clone(),
                                });
                            }
                        }
                    } else {
                        let retry_after_secs = (self.config.open_duration.as_secs() as i64
                            - elapsed.num_seconds())
                        .max(0) as u64;
                        return Err(BreakerError::Open {
                            operation: self.operation.clone(),
                            retry_after_secs,
                        });
                    }
                }
                BreakerState::HalfOpen => match self.half_open_permits.clone().try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        return Err(BreakerError::TooManyRequests {
                            operation: self.operation.clone(),
                        });
                    }
                },
            }
        };

        let result = op.await;

        let mut inner = self.inner.lock().await;
        match result {
            Ok(value) => {
                match inner.state {
                    BreakerState::Closed => {
                        inner.consecutive_failures = 0;
                    }
                    BreakerState::HalfOpen => {
                        inner.consecutive_successes += 1;
                        if inner.consecutive_successes >= self.config.success_threshold {
                            self.transition(&mut inner, BreakerState::Closed);
                        }
                    }
                    BreakerState::Open => {}
                }
                Ok(value)
            }
            Err(e) => {
                match inner.state {
                    BreakerState::Closed => {
                        inner.consecutive_failures += 1;
                        if inner.consecutive_failures >= self.config.failure_threshold {
                            self.transition(&mut inner, BreakerState::Open);
                        }
                    }
                    BreakerState::HalfOpen => {
                        self.transition(&mut inner, BreakerState::Open);
                    }
                    BreakerState::Open => {}
                }
                Err(BreakerError::OperationFailed(e))
            }
        }
    }
}

/// Named registry of breakers, one per operation (spec §9: "avoid global
/// singletons").
pub struct BreakerRegistry {
    breakers: dashmap::DashMap<String, Arc<CircuitBreaker>>,
    default_config: BreakerConfig,
}

impl BreakerRegistry {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            breakers: dashmap::DashMap::new(),
            default_config,
        }
    }

    pub fn get_or_create(&self, operation: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(operation.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(operation, self.default_config)))
            .clone()
    }

    /// Snapshot count of registered breakers currently in the `Open` state,
    /// used by the health endpoint's per-component breakdown (spec §4.13).
    pub async fn open_count(&self) -> usize {
        let snapshot: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|entry| entry.value().clone()).collect();
        let mut count = 0;
        for breaker in snapshot {
            if breaker.state().await == BreakerState::Open {
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 2,
            success_threshold: 2,
            open_duration: Duration::from_millis(20),
            half_open_permits: 1,
        }
    }

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let breaker = CircuitBreaker::new("op", fast_config());
        for _ in 0..2 {
            let _ = breaker.run(async { Err::<(), &str>("boom") }).await;
        }
        assert_eq!(breaker.state().await, BreakerState::Open);

        let err = breaker.run(async { Ok::<(), &str>(()) }).await.unwrap_err();
        assert!(matches!(err, BreakerError::Open { .. }));
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold() {
        let breaker = CircuitBreaker::new("op", fast_config());
        for _ in 0..2 {
            let _ = breaker.run(async { Err::<(), &str>("boom") }).await;
        }
        assert_eq!(breaker.state().await, BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(25)).await;

        breaker.run(async { Ok::<(), &str>(()) }).await.unwrap();
        assert_eq!(breaker.state().await, BreakerState::HalfOpen);

        tokio::time::sleep(Duration::from_millis(25)).await;
        breaker.run(async { Ok::<(), &str>(()) }).await.unwrap();
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("op", fast_config());
        for _ in 0..2 {
            let _ = breaker.run(async { Err::<(), &str>("boom") }).await;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;

        let _ = breaker.run(async { Err::<(), &str>("boom again") }).await;
        assert_eq!(breaker.state().await, BreakerState::Open);
    }

    #[tokio::test]
    async fn registry_returns_same_breaker_for_same_operation() {
        let registry = BreakerRegistry::new(BreakerConfig::default());
        let a = registry.get_or_create("call_tool");
        let b = registry.get_or_create("call_tool");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn open_count_reflects_only_open_breakers() {
        let registry = BreakerRegistry::new(fast_config());
        let stable = registry.get_or_create("stable");
        let failing = registry.get_or_create("failing");
        let _ = stable.run(async { Ok::<(), &str>(()) }).await;
        for _ in 0..2 {
            let _ = failing.run(async { Err::<(), &str>("boom") }).await;
        }
        assert_eq!(registry.open_count().await, 1);
    }

    #[tokio::test]
    async fn closed_never_blocks_concurrently() {
        let breaker = Arc::new(CircuitBreaker::new("op", BreakerConfig::default()));
        let counter = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let breaker = breaker.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                breaker
                    .run(async {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok::<(), &str>(())
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
