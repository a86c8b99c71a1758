//! OAuth token persistence and the [`TokenVault`] facade that combines it
//! with the AEAD layer in [`crate::crypto`] (spec §4.12, C12).

use crate::crypto::{self, EncryptedPayload, VaultKey};
use crate::error::VaultError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gw_core::{GatewayError, OrgId, PrincipalId};

/// Plaintext token material as handed to [`TokenVault::put`] and returned
/// by [`TokenVault::get`]. Never serialized; exists only on the stack of
/// the call that is actively encrypting or decrypting (spec §4.12:
/// "Plaintext never leaves memory of the decrypting call").
#[derive(Debug, Clone)]
pub struct TokenMaterial {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

/// The row as persisted: access/refresh tokens are sealed independently
/// so a refresh-token-only read never decrypts the access token.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct OAuthTokenRow {
    user_id: String,
    org_id: String,
    provider: String,
    access_ciphertext: String,
    access_nonce: String,
    refresh_ciphertext: Option<String>,
    refresh_nonce: Option<String>,
    expires_at: DateTime<Utc>,
    scopes: Vec<String>,
    invalid: bool,
    updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait OAuthTokenStore: Send + Sync {
    async fn upsert(
        &self,
        user_id: &PrincipalId,
        org_id: &OrgId,
        provider: &str,
        access: &EncryptedPayload,
        refresh: Option<&EncryptedPayload>,
        expires_at: DateTime<Utc>,
        scopes: &[String],
    ) -> Result<(), VaultError>;

    async fn fetch(
        &self,
        user_id: &PrincipalId,
        provider: &str,
    ) -> Result<Option<StoredToken>, VaultError>;

    async fn delete(&self, user_id: &PrincipalId, provider: &str) -> Result<(), VaultError>;

    /// Marks a token invalid after a failed refresh, so the next caller is
    /// told to re-authorize rather than handed a stale token (spec §4.11.3).
    async fn mark_invalid(&self, user_id: &PrincipalId, provider: &str) -> Result<(), VaultError>;
}

/// A fetched row, still sealed — decrypted only inside [`TokenVault::get`].
pub struct StoredToken {
    access: EncryptedPayload,
    refresh: Option<EncryptedPayload>,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
    pub invalid: bool,
}

/// REST-backed [`OAuthTokenStore`] against the `oauth_tokens` table,
/// following the same data-plane pattern as `gw_audit::RestAuditWriter`
/// and `gw_session::RestSessionStore`.
pub struct RestOAuthTokenStore {
    client: reqwest::Client,
    endpoint: String,
    credential: String,
}

impl RestOAuthTokenStore {
    pub fn new(rest_endpoint: impl Into<String>, service_role_credential: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: rest_endpoint.into(),
            credential: service_role_credential.into(),
        }
    }

    fn tokens_url(&self) -> String {
        format!("{}/oauth_tokens", self.endpoint.trim_end_matches('/'))
    }

    fn row_url(&self, user_id: &PrincipalId, provider: &str) -> String {
        format!(
            "{}?user_id=eq.{}&provider=eq.{}",
            self.tokens_url(),
            user_id,
            provider
        )
    }
}

#[async_trait]
impl OAuthTokenStore for RestOAuthTokenStore {
    async fn upsert(
        &self,
        user_id: &PrincipalId,
        org_id: &OrgId,
        provider: &str,
        access: &EncryptedPayload,
        refresh: Option<&EncryptedPayload>,
        expires_at: DateTime<Utc>,
        scopes: &[String],
    ) -> Result<(), VaultError> {
        let row = OAuthTokenRow {
            user_id: user_id.to_string(),
            org_id: org_id.to_string(),
            provider: provider.to_string(),
            access_ciphertext: access.ciphertext.clone(),
            access_nonce: access.nonce.clone(),
            refresh_ciphertext: refresh.map(|r| r.ciphertext.clone()),
            refresh_nonce: refresh.map(|r| r.nonce.clone()),
            expires_at,
            scopes: scopes.to_vec(),
            invalid: false,
            updated_at: Utc::now(),
        };
        let response = self
            .client
            .post(self.tokens_url())
            .bearer_auth(&self.credential)
            .header("Prefer", "resolution=merge-duplicates")
            .json(&row)
            .send()
            .await
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VaultError::Storage(format!(
                "oauth token upsert failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn fetch(
        &self,
        user_id: &PrincipalId,
        provider: &str,
    ) -> Result<Option<StoredToken>, VaultError> {
        let response = self
            .client
            .get(self.row_url(user_id, provider))
            .bearer_auth(&self.credential)
            .send()
            .await
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VaultError::Storage(format!(
                "oauth token fetch failed with status {}",
                response.status()
            )));
        }
        let mut rows: Vec<OAuthTokenRow> = response
            .json()
            .await
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        let Some(row) = rows.pop() else {
            return Ok(None);
        };
        let refresh = match (row.refresh_ciphertext, row.refresh_nonce) {
            (Some(ciphertext), Some(nonce)) => Some(EncryptedPayload { ciphertext, nonce }),
            _ => None,
        };
        Ok(Some(StoredToken {
            access: EncryptedPayload {
                ciphertext: row.access_ciphertext,
                nonce: row.access_nonce,
            },
            refresh,
            expires_at: row.expires_at,
            scopes: row.scopes,
            invalid: row.invalid,
        }))
    }

    async fn delete(&self, user_id: &PrincipalId, provider: &str) -> Result<(), VaultError> {
        let response = self
            .client
            .delete(self.row_url(user_id, provider))
            .bearer_auth(&self.credential)
            .send()
            .await
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        if !response.status().is_success() && response.status().as_u16() != 404 {
            return Err(VaultError::Storage(format!(
                "oauth token delete failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn mark_invalid(&self, user_id: &PrincipalId, provider: &str) -> Result<(), VaultError> {
        let patch = serde_json::json!({ "invalid": true, "updated_at": Utc::now() });
        let response = self
            .client
            .patch(self.row_url(user_id, provider))
            .bearer_auth(&self.credential)
            .json(&patch)
            .send()
            .await
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VaultError::Storage(format!(
                "oauth token invalidate failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Default refresh threshold: a token is due for refresh once its expiry
/// falls within this window (spec §4.11.3: "default 5 minutes").
pub const DEFAULT_REFRESH_THRESHOLD_SECS: i64 = 300;

/// Combines encryption with storage behind the three-verb interface spec
/// §4.12 names: `put`, `get`, `delete`.
pub struct TokenVault {
    store: Box<dyn OAuthTokenStore>,
    key: VaultKey,
}

impl TokenVault {
    pub fn new(store: Box<dyn OAuthTokenStore>, key: VaultKey) -> Self {
        Self { store, key }
    }

    pub async fn put(
        &self,
        user_id: &PrincipalId,
        org_id: &OrgId,
        provider: &str,
        material: &TokenMaterial,
    ) -> Result<(), GatewayError> {
        let access = crypto::encrypt(&material.access_token, &self.key)?;
        let refresh = material
            .refresh_token
            .as_deref()
            .map(|t| crypto::encrypt(t, &self.key))
            .transpose()?;
        self.store
            .upsert(
                user_id,
                org_id,
                provider,
                &access,
                refresh.as_ref(),
                material.expires_at,
                &material.scopes,
            )
            .await?;
        Ok(())
    }

    pub async fn get(
        &self,
        user_id: &PrincipalId,
        provider: &str,
    ) -> Result<TokenMaterial, GatewayError> {
        let Some(row) = self.store.fetch(user_id, provider).await? else {
            return Err(VaultError::NotFound.into());
        };
        if row.invalid {
            return Err(VaultError::NotFound.into());
        }
        let access_token = crypto::decrypt(&row.access, &self.key)?;
        let refresh_token = row
            .refresh
            .as_ref()
            .map(|r| crypto::decrypt(r, &self.key))
            .transpose()?;
        Ok(TokenMaterial {
            access_token,
            refresh_token,
            expires_at: row.expires_at,
            scopes: row.scopes,
        })
    }

    pub async fn delete(&self, user_id: &PrincipalId, provider: &str) -> Result<(), GatewayError> {
        self.store.delete(user_id, provider).await?;
        Ok(())
    }

    pub async fn mark_invalid(
        &self,
        user_id: &PrincipalId,
        provider: &str,
    ) -> Result<(), GatewayError> {
        self.store.mark_invalid(user_id, provider).await?;
        Ok(())
    }

    /// True once `expires_at` falls within the refresh threshold of now
    /// (spec §4.11.3).
    pub fn needs_refresh(expires_at: DateTime<Utc>, threshold_secs: i64) -> bool {
        (expires_at - Utc::now()).num_seconds() <= threshold_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as base64_engine;
    use std::sync::Mutex;

    struct InMemoryStore(Mutex<std::collections::HashMap<(String, String), OAuthTokenRow>>);

    impl InMemoryStore {
        fn new() -> Self {
            Self(Mutex::new(std::collections::HashMap::new()))
        }
    }

    #[async_trait]
    impl OAuthTokenStore for InMemoryStore {
        async fn upsert(
            &self,
            user_id: &PrincipalId,
            org_id: &OrgId,
            provider: &str,
            access: &EncryptedPayload,
            refresh: Option<&EncryptedPayload>,
            expires_at: DateTime<Utc>,
            scopes: &[String],
        ) -> Result<(), VaultError> {
            self.0.lock().unwrap().insert(
                (user_id.to_string(), provider.to_string()),
                OAuthTokenRow {
                    user_id: user_id.to_string(),
                    org_id: org_id.to_string(),
                    provider: provider.to_string(),
                    access_ciphertext: access.ciphertext.clone(),
                    access_nonce: access.nonce.clone(),
                    refresh_ciphertext: refresh.map(|r| r.ciphertext.clone()),
                    refresh_nonce: refresh.map(|r| r.nonce.clone()),
                    expires_at,
                    scopes: scopes.to_vec(),
                    invalid: false,
                    updated_at: Utc::now(),
                },
            );
            Ok(())
        }

        async fn fetch(
            &self,
            user_id: &PrincipalId,
            provider: &str,
        ) -> Result<Option<StoredToken>, VaultError> {
            let guard = self.0.lock().unwrap();
            let Some(row) = guard.get(&(user_id.to_string(), provider.to_string())) else {
                return Ok(None);
            };
            let refresh = match (&row.refresh_ciphertext, &row.refresh_nonce) {
                (Some(c), Some(n)) => Some(EncryptedPayload {
                    ciphertext: c.clone(),
                    nonce: n.clone(),
                }),
                _ => None,
            };
            Ok(Some(StoredToken {
                access: EncryptedPayload {
                    ciphertext: row.access_ciphertext.clone(),
                    nonce: row.access_nonce.clone(),
                },
                refresh,
                expires_at: row.expires_at,
                scopes: row.scopes.clone(),
                invalid: row.invalid,
            }))
        }

        async fn delete(&self, user_id: &PrincipalId, provider: &str) -> Result<(), VaultError> {
            self.0
                .lock()
                .unwrap()
                .remove(&(user_id.to_string(), provider.to_string()));
            Ok(())
        }

        async fn mark_invalid(&self, user_id: &PrincipalId, provider: &str) -> Result<(), VaultError> {
            if let Some(row) = self
                .0
                .lock()
                .unwrap()
                .get_mut(&(user_id.to_string(), provider.to_string()))
            {
                row.invalid = true;
            }
            Ok(())
        }
    }

    fn test_key() -> VaultKey {
        VaultKey::from_base64(&base64_engine.encode([3u8; 32])).unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trips_plaintext() {
        let vault = TokenVault::new(Box::new(InMemoryStore::new()), test_key());
        let user = PrincipalId::from("u-1".to_string());
        let org = OrgId::from("org-1".to_string());
        let material = TokenMaterial {
            access_token: "access-xyz".to_string(),
            refresh_token: Some("refresh-xyz".to_string()),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            scopes: vec!["read".to_string()],
        };
        vault.put(&user, &org, "github", &material).await.unwrap();

        let fetched = vault.get(&user, "github").await.unwrap();
        assert_eq!(fetched.access_token, "access-xyz");
        assert_eq!(fetched.refresh_token.as_deref(), Some("refresh-xyz"));
    }

    #[tokio::test]
    async fn get_missing_token_is_not_found() {
        let vault = TokenVault::new(Box::new(InMemoryStore::new()), test_key());
        let user = PrincipalId::from("u-1".to_string());
        let err = vault.get(&user, "github").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn invalid_token_is_not_returned() {
        let vault = TokenVault::new(Box::new(InMemoryStore::new()), test_key());
        let user = PrincipalId::from("u-1".to_string());
        let org = OrgId::from("org-1".to_string());
        let material = TokenMaterial {
            access_token: "access-xyz".to_string(),
            refresh_token: None,
            expires_at: Utc::now() + chrono::Duration::hours(1),
            scopes: vec![],
        };
        vault.put(&user, &org, "github", &material).await.unwrap();
        vault.mark_invalid(&user, "github").await.unwrap();
        assert!(vault.get(&user, "github").await.is_err());
    }

    #[test]
    fn needs_refresh_true_within_threshold() {
        let soon = Utc::now() + chrono::Duration::seconds(120);
        assert!(TokenVault::needs_refresh(soon, 300));
        let later = Utc::now() + chrono::Duration::hours(2);
        assert!(!TokenVault::needs_refresh(later, 300));
    }
}
