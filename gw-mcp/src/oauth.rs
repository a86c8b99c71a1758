//! OAuth PKCE+state connection flow for MCP servers whose transport
//! requires user-authorized upstream access (spec §4.11 steps 1-4).

use crate::error::McpError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as base64url;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gw_audit::{AuditEventBuilder, AuditLogger};
use gw_core::{GatewayError, OrgId, PrincipalId};
use gw_vault::{TokenMaterial, TokenVault};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

const PKCE_VERIFIER_LEN: usize = 128;
const STATE_BYTE_LEN: usize = 32;
const STATE_TTL_MINUTES: i64 = 10;
const PKCE_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

fn generate_pkce_verifier() -> String {
    let mut rng = rand::rng();
    (0..PKCE_VERIFIER_LEN)
        .map(|_| {
            let idx = (rng.next_u32() as usize) % PKCE_CHARSET.len();
            PKCE_CHARSET[idx] as char
        })
        .collect()
}

fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64url.encode(digest)
}

fn generate_state_token() -> String {
    let mut bytes = [0u8; STATE_BYTE_LEN];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OAuthStateRow {
    pub state: String,
    pub owner: String,
    pub org_id: String,
    pub mcp_name: String,
    pub provider: String,
    pub pkce_verifier: String,
    pub redirect_uri: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

#[async_trait]
pub trait OAuthStateStore: Send + Sync {
    async fn insert(&self, row: &OAuthStateRow) -> Result<(), McpError>;

    /// Atomically marks a row used and returns it, or `None` if no
    /// matching unused row exists (spec §4.11.2: "require `used=false`
    /// and not expired, mark `used=true` in the same transaction").
    async fn consume(&self, state: &str) -> Result<Option<OAuthStateRow>, McpError>;

    /// Deletes every row past its `expires_at` (spec §3: "Cleaned by a
    /// periodic sweep"). Returns the number of rows removed, for logging.
    async fn sweep_expired(&self) -> Result<u64, McpError>;
}

/// REST-backed [`OAuthStateStore`]. `consume` relies on the REST
/// data-plane's conditional-update support: a `PATCH` filtered on
/// `used=eq.false` only matches (and returns) a row that was still
/// unused, giving single-use semantics without a client-side transaction.
pub struct RestOAuthStateStore {
    client: reqwest::Client,
    endpoint: String,
    credential: String,
}

impl RestOAuthStateStore {
    pub fn new(rest_endpoint: impl Into<String>, service_role_credential: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: rest_endpoint.into(),
            credential: service_role_credential.into(),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/oauth_states", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl OAuthStateStore for RestOAuthStateStore {
    async fn insert(&self, row: &OAuthStateRow) -> Result<(), McpError> {
        let response = self
            .client
            .post(self.collection_url())
            .bearer_auth(&self.credential)
            .json(row)
            .send()
            .await
            .map_err(|e| McpError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(McpError::Storage(format!(
                "oauth state insert failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn consume(&self, state: &str) -> Result<Option<OAuthStateRow>, McpError> {
        let url = format!("{}?state=eq.{}&used=eq.false", self.collection_url(), state);
        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.credential)
            .header("Prefer", "return=representation")
            .json(&serde_json::json!({ "used": true }))
            .send()
            .await
            .map_err(|e| McpError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(McpError::Storage(format!(
                "oauth state consume failed with status {}",
                response.status()
            )));
        }
        let mut rows: Vec<OAuthStateRow> =
            response.json().await.map_err(|e| McpError::Storage(e.to_string()))?;
        Ok(rows.pop())
    }

    async fn sweep_expired(&self) -> Result<u64, McpError> {
        let url = format!(
            "{}?expires_at=lt.{}",
            self.collection_url(),
            Utc::now().to_rfc3339()
        );
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.credential)
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(|e| McpError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(McpError::Storage(format!(
                "oauth state sweep failed with status {}",
                response.status()
            )));
        }
        let rows: Vec<OAuthStateRow> =
            response.json().await.map_err(|e| McpError::Storage(e.to_string()))?;
        Ok(rows.len() as u64)
    }
}

/// Static per-provider endpoint configuration (spec §1: "the
/// OAuth-provider-specific token-endpoint formats" are out of scope —
/// only this contract is specified).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub revoke_url: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
}

pub struct InitiateResult {
    pub authorization_url: String,
    pub state: String,
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Drives the initiate/callback/refresh/revoke flow (spec §4.11).
pub struct OAuthFlow {
    http: reqwest::Client,
    state_store: Box<dyn OAuthStateStore>,
    vault: Arc<TokenVault>,
    audit: AuditLogger,
    providers: HashMap<String, ProviderConfig>,
}

impl OAuthFlow {
    pub fn new(
        state_store: Box<dyn OAuthStateStore>,
        vault: Arc<TokenVault>,
        audit: AuditLogger,
        providers: HashMap<String, ProviderConfig>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            state_store,
            vault,
            audit,
            providers,
        }
    }

    fn provider(&self, provider: &str) -> Result<&ProviderConfig, McpError> {
        self.providers
            .get(provider)
            .ok_or_else(|| McpError::InvalidConfig(format!("unknown oauth provider: {provider}")))
    }

    pub async fn initiate(
        &self,
        owner: &PrincipalId,
        org_id: &OrgId,
        mcp_name: &str,
        provider: &str,
        redirect_uri: &str,
    ) -> Result<InitiateResult, GatewayError> {
        let provider_config = self.provider(provider)?;
        let verifier = generate_pkce_verifier();
        let challenge = pkce_challenge(&verifier);
        let state = generate_state_token();
        let now = Utc::now();

        let row = OAuthStateRow {
            state: state.clone(),
            owner: owner.to_string(),
            org_id: org_id.to_string(),
            mcp_name: mcp_name.to_string(),
            provider: provider.to_string(),
            pkce_verifier: verifier,
            redirect_uri: redirect_uri.to_string(),
            created_at: now,
            expires_at: now + ChronoDuration::minutes(STATE_TTL_MINUTES),
            used: false,
        };
        self.state_store.insert(&row).await?;

        let scopes = provider_config.scopes.join(" ");
        let authorization_url = format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&state={}&code_challenge={}&code_challenge_method=S256&scope={}",
            provider_config.authorize_url,
            provider_config.client_id,
            urlencode(redirect_uri),
            state,
            challenge,
            urlencode(&scopes),
        );

        Ok(InitiateResult { authorization_url, state })
    }

    pub async fn callback(&self, code: &str, state: &str) -> Result<(), GatewayError> {
        let Some(row) = self.state_store.consume(state).await? else {
            return Err(McpError::InvalidOAuthState.into());
        };
        if row.expires_at < Utc::now() {
            return Err(McpError::InvalidOAuthState.into());
        }

        let provider_config = self.provider(&row.provider)?;
        let response = self
            .http
            .post(&provider_config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &row.redirect_uri),
                ("code_verifier", &row.pkce_verifier),
                ("client_id", &provider_config.client_id),
                ("client_secret", &provider_config.client_secret),
            ])
            .send()
            .await
            .map_err(|e| McpError::TokenExchangeFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(McpError::TokenExchangeFailed(format!(
                "token endpoint returned status {}",
                response.status()
            ))
            .into());
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| McpError::TokenExchangeFailed(e.to_string()))?;

        let owner = PrincipalId::from(row.owner.clone());
        let org_id = OrgId::from(row.org_id.clone());
        let material = TokenMaterial {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + ChronoDuration::seconds(token.expires_in.unwrap_or(3600)),
            scopes: provider_config.scopes.clone(),
        };
        self.vault.put(&owner, &org_id, &row.provider, &material).await?;

        self.audit.emit(
            AuditEventBuilder::new(row.owner.clone(), "mcp.oauth.callback", "ok")
                .org_id(row.org_id.clone())
                .resource("mcp_config", row.mcp_name.clone())
                .details(serde_json::json!({ "provider": row.provider }))
                .build(),
        );
        Ok(())
    }

    /// Refreshes a token if it is within the threshold of expiry,
    /// replacing it only on success; on failure the token is marked
    /// invalid so the next caller is told to re-authorize (spec §4.11.3).
    pub async fn refresh_if_needed(
        &self,
        owner: &PrincipalId,
        org_id: &OrgId,
        provider: &str,
        threshold_secs: i64,
    ) -> Result<(), GatewayError> {
        let current = self.vault.get(owner, provider).await?;
        if !TokenVault::needs_refresh(current.expires_at, threshold_secs) {
            return Ok(());
        }
        let Some(refresh_token) = current.refresh_token.clone() else {
            return Ok(());
        };
        let provider_config = self.provider(provider)?;

        let result = self
            .http
            .post(&provider_config.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", provider_config.client_id.as_str()),
                ("client_secret", provider_config.client_secret.as_str()),
            ])
            .send()
            .await;

        let refreshed = match result {
            Ok(response) if response.status().is_success() => {
                response.json::<TokenResponse>().await.ok()
            }
            _ => None,
        };

        match refreshed {
            Some(token) => {
                let material = TokenMaterial {
                    access_token: token.access_token,
                    refresh_token: token.refresh_token.or(Some(refresh_token)),
                    expires_at: Utc::now() + ChronoDuration::seconds(token.expires_in.unwrap_or(3600)),
                    scopes: current.scopes,
                };
                self.vault.put(owner, org_id, provider, &material).await?;
                Ok(())
            }
            None => {
                self.vault.mark_invalid(owner, provider).await?;
                Err(McpError::TokenExchangeFailed(
                    "refresh failed; re-authorization required".to_string(),
                )
                .into())
            }
        }
    }

    pub async fn revoke(
        &self,
        owner: &PrincipalId,
        provider: &str,
    ) -> Result<(), GatewayError> {
        if let Ok(material) = self.vault.get(owner, provider).await {
            if let Some(provider_config) = self.providers.get(provider) {
                if let Some(revoke_url) = &provider_config.revoke_url {
                    let _ = self
                        .http
                        .post(revoke_url)
                        .form(&[
                            ("token", material.access_token.as_str()),
                            ("client_id", provider_config.client_id.as_str()),
                            ("client_secret", provider_config.client_secret.as_str()),
                        ])
                        .send()
                        .await;
                }
            }
        }
        self.vault.delete(owner, provider).await
    }

    /// Deletes expired OAuth state rows (spec §3: "Cleaned by a periodic
    /// sweep"). Intended to be driven by a caller-owned interval loop.
    pub async fn sweep_expired_state(&self) -> Result<u64, GatewayError> {
        Ok(self.state_store.sweep_expired().await?)
    }
}

fn urlencode(value: &str) -> String {
    const SAFE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
    value
        .bytes()
        .map(|b| {
            if SAFE.contains(&b) {
                (b as char).to_string()
            } else {
                format!("%{b:02X}")
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_verifier_has_spec_length() {
        assert_eq!(generate_pkce_verifier().len(), PKCE_VERIFIER_LEN);
    }

    #[test]
    fn pkce_verifier_uses_only_unreserved_characters() {
        let verifier = generate_pkce_verifier();
        assert!(verifier.bytes().all(|b| PKCE_CHARSET.contains(&b)));
    }

    #[test]
    fn state_token_is_64_hex_chars() {
        let state = generate_state_token();
        assert_eq!(state.len(), 64);
        assert!(state.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn challenge_is_deterministic_for_same_verifier() {
        let verifier = generate_pkce_verifier();
        assert_eq!(pkce_challenge(&verifier), pkce_challenge(&verifier));
    }

    #[test]
    fn urlencode_escapes_reserved_characters() {
        assert_eq!(urlencode("a b"), "a%20b");
        assert_eq!(urlencode("https://x.com"), "https%3A%2F%2Fx.com");
    }
}
