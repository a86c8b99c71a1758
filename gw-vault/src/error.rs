use gw_core::GatewayError;
use thiserror::Error;

/// Internal token-vault error. Converted to [`GatewayError`] at the crate
/// boundary so callers only ever see the shared taxonomy.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("no token stored for this (principal, provider) pair")]
    NotFound,

    #[error("token decryption failed: ciphertext or tag mismatch")]
    DecryptionFailed,

    #[error("vault key material is misconfigured: {0}")]
    KeyMaterial(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl VaultError {
    pub fn category(&self) -> &'static str {
        match self {
            VaultError::NotFound => "not_found",
            VaultError::DecryptionFailed => "decryption_failed",
            VaultError::KeyMaterial(_) => "key_material",
            VaultError::Storage(_) => "storage",
        }
    }
}

impl From<VaultError> for GatewayError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::NotFound => GatewayError::NotFound("oauth token".to_string()),
            VaultError::DecryptionFailed => {
                GatewayError::Storage("token decryption failed".to_string())
            }
            VaultError::KeyMaterial(detail) => GatewayError::Config(detail),
            VaultError::Storage(detail) => GatewayError::Storage(detail),
        }
    }
}
