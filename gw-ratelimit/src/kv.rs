use std::time::Duration;

/// Minimal atomic-increment KV abstraction the rate limiter needs. A real
/// `fred`-backed client implements this; tests use an in-memory stub.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    /// Atomically increments `key`, ensuring it carries `ttl` (set only
    /// when the key is newly created), and returns the post-increment
    /// count.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, KvUnavailable>;
}

#[derive(Debug, Clone, Copy)]
pub struct KvUnavailable;

impl std::fmt::Display for KvUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "kv store unavailable")
    }
}
impl std::error::Error for KvUnavailable {}

pub struct FredKvStore {
    client: fred::clients::Client,
}

impl FredKvStore {
    /// Connects lazily; `fred::clients::Client::init` is called by the
    /// caller at startup (spec §4.13 readiness probes depend on this
    /// having already succeeded once).
    pub fn new(client: fred::clients::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl KvStore for FredKvStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, KvUnavailable> {
        use fred::interfaces::KeysInterface;

        let count: i64 = self.client.incr(key).await.map_err(|_| KvUnavailable)?;
        if count == 1 {
            let _: Result<(), _> = self.client.expire(key, ttl.as_secs() as i64).await;
        }
        Ok(count as u64)
    }
}
