//! Per-issuer cache of signature-verification keys (spec §4.1, C1).
//!
//! Keyed by issuer URL. `resolve` synchronously fetches the published JWKS
//! document on cache miss or past expiry, coalescing concurrent misses for
//! the same issuer behind a per-issuer async mutex so only one fetch is
//! ever in flight at a time.

mod error;

pub use error::KeysError;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::jwk::{JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const KEY_SET_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct ResolvedKey {
    pub decoding_key: DecodingKey,
    pub algorithm: Algorithm,
}

struct CachedKeySet {
    keys: HashMap<String, ResolvedKey>,
    fetched_at: DateTime<Utc>,
}

impl CachedKeySet {
    fn is_fresh(&self) -> bool {
        Utc::now() - self.fetched_at < ChronoDuration::hours(KEY_SET_TTL_HOURS)
    }
}

/// Fetches a JWKS document over HTTP. Production callers use
/// [`HttpJwksFetcher`]; tests substitute a stub.
#[async_trait::async_trait]
pub trait JwksFetcher: Send + Sync {
    async fn fetch(&self, jwks_url: &str) -> Result<JwkSet, KeysError>;
}

pub struct HttpJwksFetcher {
    client: reqwest::Client,
}

impl Default for HttpJwksFetcher {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self, jwks_url: &str) -> Result<JwkSet, KeysError> {
        let response = self
            .client
            .get(jwks_url)
            .send()
            .await
            .map_err(|_| KeysError::UpstreamUnavailable {
                issuer: jwks_url.to_string(),
            })?;
        response
            .json::<JwkSet>()
            .await
            .map_err(|e| KeysError::MalformedDocument {
                issuer: jwks_url.to_string(),
                detail: e.to_string(),
            })
    }
}

fn algorithm_from_jwk_alg(jwks_url: &str, alg: KeyAlgorithm) -> Result<Algorithm, KeysError> {
    match alg {
        KeyAlgorithm::RS256 => Ok(Algorithm::RS256),
        KeyAlgorithm::RS384 => Ok(Algorithm::RS384),
        KeyAlgorithm::RS512 => Ok(Algorithm::RS512),
        KeyAlgorithm::ES256 => Ok(Algorithm::ES256),
        KeyAlgorithm::ES384 => Ok(Algorithm::ES384),
        KeyAlgorithm::PS256 => Ok(Algorithm::PS256),
        KeyAlgorithm::PS384 => Ok(Algorithm::PS384),
        KeyAlgorithm::PS512 => Ok(Algorithm::PS512),
        other => Err(KeysError::UnsupportedAlgorithm {
            issuer: jwks_url.to_string(),
            detail: format!("{other:?}"),
        }),
    }
}

fn parse_key_set(jwks_url: &str, document: JwkSet) -> Result<CachedKeySet, KeysError> {
    let mut keys = HashMap::new();
    for jwk in document.keys {
        let Some(key_id) = jwk.common.key_id.clone() else {
            continue;
        };
        let Some(key_algorithm) = jwk.common.key_algorithm else {
            continue;
        };
        let algorithm = algorithm_from_jwk_alg(jwks_url, key_algorithm)?;
        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| KeysError::MalformedDocument {
            issuer: jwks_url.to_string(),
            detail: e.to_string(),
        })?;
        keys.insert(
            key_id,
            ResolvedKey {
                decoding_key,
                algorithm,
            },
        );
    }
    Ok(CachedKeySet {
        keys,
        fetched_at: Utc::now(),
    })
}

struct IssuerEntry {
    jwks_url: String,
    cache: Mutex<Option<CachedKeySet>>,
}

/// Process-wide key-set cache, module-level state with explicit
/// construction rather than a hidden singleton (spec §9).
pub struct KeyCache {
    fetcher: Arc<dyn JwksFetcher>,
    issuers: dashmap::DashMap<String, Arc<IssuerEntry>>,
}

impl KeyCache {
    pub fn new(fetcher: Arc<dyn JwksFetcher>) -> Self {
        Self {
            fetcher,
            issuers: dashmap::DashMap::new(),
        }
    }

    pub fn with_http_fetcher() -> Self {
        Self::new(Arc::new(HttpJwksFetcher::default()))
    }

    fn entry_for(&self, issuer: &str, jwks_url: &str) -> Arc<IssuerEntry> {
        self.issuers
            .entry(issuer.to_string())
            .or_insert_with(|| {
                Arc::new(IssuerEntry {
                    jwks_url: jwks_url.to_string(),
                    cache: Mutex::new(None),
                })
            })
            .clone()
    }

    /// Resolves a verification key for `(issuer, key_id)`, fetching or
    /// refreshing the issuer's key set as needed (spec §4.1).
    pub async fn resolve(
        &self,
        issuer: &str,
        jwks_url: &str,
        key_id: &str,
    ) -> Result<ResolvedKey, KeysError> {
        let entry = self.entry_for(issuer, jwks_url);
        let mut guard = entry.cache.lock().await;

        if let Some(cached) = guard.as_ref() {
            if cached.is_fresh() {
                if let Some(key) = cached.keys.get(key_id) {
                    return Ok(key.clone());
                }
            }
        }

        let document = self.fetcher.fetch(&entry.jwks_url).await.map_err(|_| {
            KeysError::UpstreamUnavailable {
                issuer: issuer.to_string(),
            }
        })?;
        let fresh = parse_key_set(&entry.jwks_url, document)?;
        let resolved = fresh.keys.get(key_id).cloned();
        *guard = Some(fresh);

        resolved.ok_or_else(|| KeysError::UnknownKey {
            issuer: issuer.to_string(),
            key_id: key_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::jwk::{
        AlgorithmParameters, CommonParameters, Jwk, PublicKeyUse, RSAKeyParameters,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        key_id: String,
    }

    fn rsa_jwk(key_id: &str) -> Jwk {
        Jwk {
            common: CommonParameters {
                public_key_use: Some(PublicKeyUse::Signature),
                key_operations: None,
                key_algorithm: Some(KeyAlgorithm::RS256),
                key_id: Some(key_id.to_string()),
                x509_url: None,
                x509_chain: None,
                x509_sha1_fingerprint: None,
                x509_sha256_fingerprint: None,
            },
            algorithm: AlgorithmParameters::RSA(RSAKeyParameters {
                key_type: jsonwebtoken::jwk::RSAKeyType::RSA,
                n: "sXchFKaHQBDdYt6oLOQ-tPdqJQeNc2TItxDXGkhyYRFWXm1TTt2a2_wwRwWLTsPKU4EsTWFx8fRdrKwRZxHVkoRnQ2m5xaY1aZ5XkXs4bIUsd_kVEdwAIV1fo4ZtF1FhDMVz2jCohIGUJ2DoqVcX4gNK2qaj3MzFmOVQDHimQks".to_string(),
                e: "AQAB".to_string(),
            }),
        }
    }

    #[async_trait::async_trait]
    impl JwksFetcher for CountingFetcher {
        async fn fetch(&self, _jwks_url: &str) -> Result<JwkSet, KeysError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(JwkSet {
                keys: vec![rsa_jwk(&self.key_id)],
            })
        }
    }

    #[tokio::test]
    async fn resolves_known_key_and_caches_it() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            key_id: "kid-1".to_string(),
        });
        let cache = KeyCache::new(fetcher.clone());

        cache
            .resolve("issuer-a", "https://issuer-a/.well-known/jwks.json", "kid-1")
            .await
            .expect("first resolve should fetch and succeed");
        cache
            .resolve("issuer-a", "https://issuer-a/.well-known/jwks.json", "kid-1")
            .await
            .expect("second resolve should hit cache");

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_key_forces_one_refetch_then_fails() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            key_id: "kid-1".to_string(),
        });
        let cache = KeyCache::new(fetcher.clone());

        let err = cache
            .resolve("issuer-a", "https://issuer-a/.well-known/jwks.json", "kid-missing")
            .await
            .unwrap_err();

        assert!(matches!(err, KeysError::UnknownKey { .. }));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    struct FailingFetcher;

    #[async_trait::async_trait]
    impl JwksFetcher for FailingFetcher {
        async fn fetch(&self, _jwks_url: &str) -> Result<JwkSet, KeysError> {
            Err(KeysError::UpstreamUnavailable {
                issuer: "issuer-a".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn fetch_failure_with_no_cache_is_upstream_unavailable() {
        let cache = KeyCache::new(Arc::new(FailingFetcher));
        let err = cache
            .resolve("issuer-a", "https://issuer-a/.well-known/jwks.json", "kid-1")
            .await
            .unwrap_err();
        assert!(matches!(err, KeysError::UpstreamUnavailable { .. }));
    }
}
