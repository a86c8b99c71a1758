//! The credential chain itself (spec §4.2, C2): static credential, then
//! database-backed API key, then signed bearer token — each step either
//! succeeds, "skips" (falls through to the next step), or fails terminally.
//! Modeled as an explicit pipeline rather than dynamic dispatch, per the
//! re-architecture note in spec §9.

use crate::error::AuthError;
use crate::stores::{ApiKeyRecord, ApiKeyStore, PrincipalLookup};
use base64::Engine;
use chrono::Utc;
use gw_config::{IssuerConfig, StaticCredentialConfig};
use gw_core::{AuthMethod, GatewayError, OrgId, Principal, PrincipalId, Role};
use gw_keys::KeyCache;
use jsonwebtoken::{Validation, decode, decode_header};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Claim name carrying the organization id, which varies by issuer (spec
/// §4.2 step 3).
fn org_claim_for(issuer_id: &'static str) -> &'static str {
    match issuer_id {
        "issuer_a" => "org_id",
        "issuer_b" => "org",
        _ => "org_id",
    }
}

const CLOCK_SKEW_SECS: u64 = 60;

fn hash_bearer(bearer: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bearer.as_bytes());
    hex::encode(hasher.finalize())
}

/// Reads the `iss` claim from a JWT's payload segment without verifying its
/// signature (spec §4.2 step 3: "parse without verification to read the
/// issuer claim").
fn peek_issuer(token: &str) -> Result<String, AuthError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_sig)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::MalformedBearer);
    };
    if parts.next().is_some() {
        return Err(AuthError::MalformedBearer);
    }
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::MalformedBearer)?;
    let claims: Value = serde_json::from_slice(&bytes).map_err(|_| AuthError::MalformedBearer)?;
    claims
        .get("iss")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(AuthError::MalformedBearer)
}

fn issuer_matching(issuers: &[IssuerConfig], iss_claim: &str) -> Option<&IssuerConfig> {
    issuers.iter().find(|issuer| {
        issuer.id == iss_claim || issuer.jwks_url.starts_with(iss_claim.trim_end_matches('/'))
    })
}

/// Resolves a bearer credential to a [`Principal`] via the priority chain
/// in spec §4.2. Holds the static-credential config, a key-value-backed
/// `ApiKeyStore`, the configured issuer list, the shared [`KeyCache`], and
/// a `PrincipalLookup` for the platform-admin lift.
pub struct CredentialValidator {
    static_credential: Option<StaticCredentialConfig>,
    api_keys: Arc<dyn ApiKeyStore>,
    issuers: Vec<IssuerConfig>,
    keys: Arc<KeyCache>,
    principals: Arc<dyn PrincipalLookup>,
}

impl CredentialValidator {
    pub fn new(
        static_credential: Option<StaticCredentialConfig>,
        api_keys: Arc<dyn ApiKeyStore>,
        issuers: Vec<IssuerConfig>,
        keys: Arc<KeyCache>,
        principals: Arc<dyn PrincipalLookup>,
    ) -> Self {
        Self {
            static_credential,
            api_keys,
            issuers,
            keys,
            principals,
        }
    }

    /// `validate(bearer) -> Principal | error` (spec §4.2). `bearer` is the
    /// raw string after the `Bearer ` prefix — callers (the tiered-access
    /// middleware) are responsible for requiring and stripping the prefix.
    pub async fn validate(&self, bearer: &str) -> Result<Principal, GatewayError> {
        if bearer.is_empty() {
            return Err(GatewayError::MalformedBearer);
        }

        if let Some(principal) = self.try_static(bearer) {
            return Ok(principal);
        }

        match self.try_db_key(bearer).await {
            Ok(Some(principal)) => return Ok(principal),
            Ok(None) => {}
            Err(e) => return Err(e.into()),
        }

        self.try_signed_token(bearer)
            .await
            .map_err(GatewayError::from)
    }

    /// Step 1: byte-compare against the static credential. Short-circuits
    /// on match — DB and signed-token paths are never attempted (spec §4.2
    /// edge cases; spec §8 testable property on `authentication_method`).
    fn try_static(&self, bearer: &str) -> Option<Principal> {
        let cfg = self.static_credential.as_ref()?;
        if cfg.key != bearer {
            return None;
        }
        Some(Principal {
            id: PrincipalId::from(cfg.user_id.clone()),
            org_id: OrgId::from(cfg.org_id.clone()),
            email: cfg.email.clone(),
            display_name: cfg.name.clone(),
            role: Role::PlatformAdmin,
            auth_method: AuthMethod::Static,
        })
    }

    /// Step 2: hash the bearer, look up by hash, require active and
    /// unexpired. Returns `Ok(None)` to fall through (hash not found);
    /// `Err` for a terminal failure against a row that *was* found.
    async fn try_db_key(&self, bearer: &str) -> Result<Option<Principal>, AuthError> {
        let hash = hash_bearer(bearer);
        let record = self
            .api_keys
            .lookup_by_hash(&hash)
            .await
            .map_err(|_| AuthError::UpstreamUnavailable)?;
        let Some(record) = record else {
            return Ok(None);
        };

        if !record.active {
            return Err(AuthError::Revoked);
        }
        if let Some(expires_at) = record.expires_at {
            if expires_at <= Utc::now() {
                return Err(AuthError::Expired);
            }
        }

        self.api_keys.touch_last_used(&hash).await;

        let role = if record.is_platform_admin {
            Role::PlatformAdmin
        } else {
            Role::User
        };
        Ok(Some(Principal {
            id: record.principal_id,
            org_id: record.org_id,
            email: record.email,
            display_name: record.display_name,
            role,
            auth_method: AuthMethod::DbKey,
        }))
    }

    /// Step 3: dispatch by (unverified) issuer claim, then verify the
    /// signature against the key-set cache and map standard claims.
    async fn try_signed_token(&self, bearer: &str) -> Result<Principal, AuthError> {
        let iss_claim = peek_issuer(bearer)?;
        let issuer = issuer_matching(&self.issuers, &iss_claim).ok_or(AuthError::UnknownIssuer)?;

        let header = decode_header(bearer).map_err(|_| AuthError::MalformedBearer)?;
        let key_id = header.kid.ok_or(AuthError::UnknownKey)?;

        let resolved = self
            .keys
            .resolve(issuer.id, &issuer.jwks_url, &key_id)
            .await
            .map_err(|e| match e {
                gw_keys::KeysError::UnknownKey { .. } => AuthError::UnknownKey,
                gw_keys::KeysError::UpstreamUnavailable { .. } => AuthError::UpstreamUnavailable,
                gw_keys::KeysError::UnsupportedAlgorithm { .. }
                | gw_keys::KeysError::MalformedDocument { .. } => AuthError::InvalidSignature,
            })?;

        let mut validation = Validation::new(resolved.algorithm);
        validation.leeway = CLOCK_SKEW_SECS;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.algorithms = vec![resolved.algorithm];
        // Audience is deployment-specific and out of scope (spec §1) — we
        // only assert the algorithm, expiry, and not-before.

        let token_data = decode::<Value>(bearer, &resolved.decoding_key, &validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm
                | jsonwebtoken::errors::ErrorKind::ImmatureSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidSignature,
            },
        )?;

        let claims = token_data.claims;
        let subject = claims
            .get("sub")
            .and_then(Value::as_str)
            .ok_or(AuthError::InvalidSignature)?;
        let org_claim_name = org_claim_for(issuer.id);
        let org_id = claims
            .get(org_claim_name)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let email = claims
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let name = claims
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(subject);

        let auth_method = match issuer.id {
            "issuer_a" => AuthMethod::IssuerA,
            _ => AuthMethod::IssuerB,
        };

        let role = if self.principals.is_platform_admin(subject).await {
            Role::PlatformAdmin
        } else {
            Role::User
        };

        Ok(Principal {
            id: PrincipalId::from(subject.to_string()),
            org_id: OrgId::from(org_id.to_string()),
            email: email.to_string(),
            display_name: name.to_string(),
            role,
            auth_method,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use gw_keys::{HttpJwksFetcher, JwksFetcher, KeysError};
    use jsonwebtoken::jwk::JwkSet;
    use std::sync::Mutex;

    struct StubApiKeys {
        records: Mutex<std::collections::HashMap<String, ApiKeyRecord>>,
        touched: Mutex<Vec<String>>,
    }

    impl StubApiKeys {
        fn new() -> Self {
            Self {
                records: Mutex::new(std::collections::HashMap::new()),
                touched: Mutex::new(Vec::new()),
            }
        }

        fn insert(&self, bearer: &str, record: ApiKeyRecord) {
            self.records
                .lock()
                .unwrap()
                .insert(hash_bearer(bearer), record);
        }
    }

    #[async_trait]
    impl ApiKeyStore for StubApiKeys {
        async fn lookup_by_hash(
            &self,
            hash: &str,
        ) -> Result<Option<ApiKeyRecord>, GatewayError> {
            Ok(self.records.lock().unwrap().get(hash).cloned())
        }

        async fn touch_last_used(&self, hash: &str) {
            self.touched.lock().unwrap().push(hash.to_string());
        }
    }

    struct NeverAdmin;
    #[async_trait]
    impl PrincipalLookup for NeverAdmin {
        async fn is_platform_admin(&self, _subject: &str) -> bool {
            false
        }
    }

    struct UnreachableFetcher;
    #[async_trait]
    impl JwksFetcher for UnreachableFetcher {
        async fn fetch(&self, jwks_url: &str) -> Result<JwkSet, KeysError> {
            Err(KeysError::UpstreamUnavailable {
                issuer: jwks_url.to_string(),
            })
        }
    }

    fn static_cfg() -> StaticCredentialConfig {
        StaticCredentialConfig {
            key: "dev-key".to_string(),
            user_id: "u1".to_string(),
            org_id: "o1".to_string(),
            email: "u1@example.com".to_string(),
            name: "Dev User".to_string(),
        }
    }

    fn validator_with(api_keys: Arc<dyn ApiKeyStore>) -> CredentialValidator {
        CredentialValidator::new(
            Some(static_cfg()),
            api_keys,
            vec![],
            Arc::new(KeyCache::new(Arc::new(UnreachableFetcher))),
            Arc::new(NeverAdmin),
        )
    }

    #[tokio::test]
    async fn static_match_short_circuits_chain() {
        let api_keys = Arc::new(StubApiKeys::new());
        let validator = validator_with(api_keys.clone());

        let principal = validator.validate("dev-key").await.unwrap();
        assert_eq!(principal.auth_method, AuthMethod::Static);
        assert_eq!(principal.role, Role::PlatformAdmin);
        assert!(api_keys.touched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_bearer_is_malformed() {
        let validator = validator_with(Arc::new(StubApiKeys::new()));
        let err = validator.validate("").await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedBearer));
    }

    #[tokio::test]
    async fn db_key_match_returns_principal() {
        let api_keys = Arc::new(StubApiKeys::new());
        api_keys.insert(
            "db-secret",
            ApiKeyRecord {
                principal_id: PrincipalId::from("u2".to_string()),
                org_id: OrgId::from("o2".to_string()),
                email: "u2@example.com".to_string(),
                display_name: "U2".to_string(),
                active: true,
                expires_at: None,
                is_platform_admin: false,
            },
        );
        let validator = validator_with(api_keys.clone());

        let principal = validator.validate("db-secret").await.unwrap();
        assert_eq!(principal.auth_method, AuthMethod::DbKey);
        assert_eq!(principal.role, Role::User);
        assert_eq!(api_keys.touched.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inactive_db_key_is_revoked() {
        let api_keys = Arc::new(StubApiKeys::new());
        api_keys.insert(
            "revoked-secret",
            ApiKeyRecord {
                principal_id: PrincipalId::from("u3".to_string()),
                org_id: OrgId::from("o3".to_string()),
                email: "u3@example.com".to_string(),
                display_name: "U3".to_string(),
                active: false,
                expires_at: None,
                is_platform_admin: false,
            },
        );
        let validator = validator_with(api_keys);
        let err = validator.validate("revoked-secret").await.unwrap_err();
        assert!(matches!(err, GatewayError::Revoked));
    }

    #[tokio::test]
    async fn expired_db_key_is_rejected() {
        let api_keys = Arc::new(StubApiKeys::new());
        api_keys.insert(
            "expired-secret",
            ApiKeyRecord {
                principal_id: PrincipalId::from("u4".to_string()),
                org_id: OrgId::from("o4".to_string()),
                email: "u4@example.com".to_string(),
                display_name: "U4".to_string(),
                active: true,
                expires_at: Some(Utc::now() - Duration::seconds(1)),
                is_platform_admin: false,
            },
        );
        let validator = validator_with(api_keys);
        let err = validator.validate("expired-secret").await.unwrap_err();
        assert!(matches!(err, GatewayError::Expired));
    }

    #[tokio::test]
    async fn unrecognized_credential_falls_through_to_unknown_issuer() {
        let validator = validator_with(Arc::new(StubApiKeys::new()));
        let err = validator.validate("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedBearer));
    }

    #[test]
    fn http_fetcher_default_constructs() {
        let _ = HttpJwksFetcher::default();
    }
}
