//! Collaborator traits the validator depends on. Production callers wire a
//! REST-backed implementation against the storage data-plane (spec §6,
//! `principals` / `api_keys` tables); tests substitute an in-memory stub —
//! the same seam `gw-keys::JwksFetcher` and `gw-ratelimit::KvStore` use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gw_core::{OrgId, PrincipalId};

/// A row from the `api_keys` table, joined to its owning principal (spec §3
/// `ApiKey`).
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub principal_id: PrincipalId,
    pub org_id: OrgId,
    pub email: String,
    pub display_name: String,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_platform_admin: bool,
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Looks a key up by its one-way hash. `None` means "no such key" — the
    /// validator falls through to the next chain step, not a terminal
    /// error (spec §4.2 step 2).
    async fn lookup_by_hash(&self, hash: &str) -> Result<Option<ApiKeyRecord>, gw_core::GatewayError>;

    /// Best-effort: failure to record last-used must never fail the
    /// request (spec §7, persistence: non-critical paths are swallowed).
    async fn touch_last_used(&self, hash: &str);
}

/// Looks a subject up in the `principals` table to decide whether a
/// signed-token principal should be lifted to platform-admin (spec §4.2
/// step 3: "If a principal row in storage marks this subject as a platform
/// admin, lift the role accordingly").
#[async_trait]
pub trait PrincipalLookup: Send + Sync {
    /// Best-effort: a lookup failure must not fail the request — it just
    /// means the role is not lifted.
    async fn is_platform_admin(&self, subject: &str) -> bool;
}

#[derive(Debug, serde::Deserialize)]
struct ApiKeyRow {
    key_hash: String,
    principal_id: String,
    org_id: String,
    email: String,
    display_name: String,
    active: bool,
    expires_at: Option<DateTime<Utc>>,
    is_platform_admin: bool,
}

impl From<ApiKeyRow> for ApiKeyRecord {
    fn from(row: ApiKeyRow) -> Self {
        ApiKeyRecord {
            principal_id: PrincipalId::from(row.principal_id),
            org_id: OrgId::from(row.org_id),
            email: row.email,
            display_name: row.display_name,
            active: row.active,
            expires_at: row.expires_at,
            is_platform_admin: row.is_platform_admin,
        }
    }
}

/// REST-backed [`ApiKeyStore`], same transport idiom as
/// `gw_session::RestSessionStore` and `gw_audit::RestAuditWriter`: a
/// `reqwest::Client` against the storage REST data-plane's `api_keys`
/// table, authenticated with the service-role credential.
pub struct RestApiKeyStore {
    client: reqwest::Client,
    endpoint: String,
    credential: String,
}

impl RestApiKeyStore {
    pub fn new(rest_endpoint: impl Into<String>, service_role_credential: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: rest_endpoint.into(),
            credential: service_role_credential.into(),
        }
    }

    fn keys_url(&self) -> String {
        format!("{}/api_keys", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl ApiKeyStore for RestApiKeyStore {
    async fn lookup_by_hash(&self, hash: &str) -> Result<Option<ApiKeyRecord>, gw_core::GatewayError> {
        let url = format!("{}?key_hash=eq.{hash}", self.keys_url());
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.credential)
            .send()
            .await
            .map_err(|e| gw_core::GatewayError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(gw_core::GatewayError::Storage(format!(
                "api key lookup failed with status {}",
                response.status()
            )));
        }
        let mut rows: Vec<ApiKeyRow> = response
            .json()
            .await
            .map_err(|e| gw_core::GatewayError::Storage(e.to_string()))?;
        Ok(rows.pop().map(ApiKeyRecord::from))
    }

    async fn touch_last_used(&self, hash: &str) {
        let url = format!("{}?key_hash=eq.{hash}", self.keys_url());
        let patch = serde_json::json!({ "last_used_at": Utc::now() });
        if let Err(e) = self
            .client
            .patch(&url)
            .bearer_auth(&self.credential)
            .json(&patch)
            .send()
            .await
        {
            tracing::warn!(error = %e, "failed to record api key last-used timestamp");
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct PrincipalRow {
    is_platform_admin: bool,
}

/// REST-backed [`PrincipalLookup`] against the `principals` table.
pub struct RestPrincipalLookup {
    client: reqwest::Client,
    endpoint: String,
    credential: String,
}

impl RestPrincipalLookup {
    pub fn new(rest_endpoint: impl Into<String>, service_role_credential: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: rest_endpoint.into(),
            credential: service_role_credential.into(),
        }
    }
}

#[async_trait]
impl PrincipalLookup for RestPrincipalLookup {
    async fn is_platform_admin(&self, subject: &str) -> bool {
        let url = format!(
            "{}/principals?id=eq.{subject}",
            self.endpoint.trim_end_matches('/')
        );
        let Ok(response) = self.client.get(&url).bearer_auth(&self.credential).send().await else {
            return false;
        };
        if !response.status().is_success() {
            return false;
        }
        let Ok(mut rows) = response.json::<Vec<PrincipalRow>>().await else {
            return false;
        };
        rows.pop().map(|row| row.is_platform_admin).unwrap_or(false)
    }
}

#[cfg(test)]
mod rest_tests {
    use super::*;

    #[test]
    fn keys_url_trims_trailing_slash() {
        let store = RestApiKeyStore::new("https://storage.example.com/", "token");
        assert_eq!(store.keys_url(), "https://storage.example.com/api_keys");
    }
}
