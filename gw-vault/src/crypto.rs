//! Authenticated encryption for OAuth tokens at rest (spec §4.12, §9:
//! "Token encryption is a pure function over (plaintext, key, random IV)
//! plus a pure inverse; authenticated encryption is mandatory").
//!
//! Grounded on `adk-session`'s `encrypted-session` Cargo feature, which
//! pulls the same `aes-gcm`/`rand`/`base64` trio for session-at-rest
//! encryption.

use crate::error::VaultError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as base64_engine;
use rand::RngCore;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// 256-bit AES key read once from process configuration at startup (spec
/// §4.12: "Key material read from process configuration at startup; no
/// per-row key is persisted with the row").
#[derive(Clone)]
pub struct VaultKey(Key<Aes256Gcm>);

impl VaultKey {
    /// Decodes a standard-base64-encoded 32-byte key.
    pub fn from_base64(encoded: &str) -> Result<Self, VaultError> {
        let bytes = base64_engine
            .decode(encoded.trim())
            .map_err(|e| VaultError::KeyMaterial(format!("vault key is not valid base64: {e}")))?;
        if bytes.len() != KEY_LEN {
            return Err(VaultError::KeyMaterial(format!(
                "vault key must decode to {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(*Key::<Aes256Gcm>::from_slice(&bytes)))
    }

    /// Builds a key directly from already-decoded bytes, for callers (like
    /// `gw-config`) that decode `TOKEN_ENCRYPTION_KEY` themselves during
    /// config validation.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(*Key::<Aes256Gcm>::from_slice(&bytes))
    }
}

/// A ciphertext plus the random IV it was sealed with. Both are opaque,
/// base64-encoded strings suitable for storage in a text column.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EncryptedPayload {
    pub ciphertext: String,
    pub nonce: String,
}

/// Pure function over `(plaintext, key, random IV)` (spec §9). The IV is
/// drawn fresh from the OS CSPRNG on every call, so encrypting the same
/// plaintext twice never yields the same ciphertext.
pub fn encrypt(plaintext: &str, key: &VaultKey) -> Result<EncryptedPayload, VaultError> {
    let cipher = Aes256Gcm::new(&key.0);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| VaultError::KeyMaterial("AEAD encryption failed".to_string()))?;

    Ok(EncryptedPayload {
        ciphertext: base64_engine.encode(ciphertext),
        nonce: base64_engine.encode(nonce_bytes),
    })
}

/// The pure inverse of [`encrypt`]. Fails closed on any tampering of the
/// ciphertext, tag, or nonce.
pub fn decrypt(payload: &EncryptedPayload, key: &VaultKey) -> Result<String, VaultError> {
    let cipher = Aes256Gcm::new(&key.0);
    let nonce_bytes = base64_engine
        .decode(&payload.nonce)
        .map_err(|_| VaultError::DecryptionFailed)?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(VaultError::DecryptionFailed);
    }
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = base64_engine
        .decode(&payload.ciphertext)
        .map_err(|_| VaultError::DecryptionFailed)?;

    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_slice())
        .map_err(|_| VaultError::DecryptionFailed)?;
    String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> VaultKey {
        let raw = [7u8; KEY_LEN];
        VaultKey::from_base64(&base64_engine.encode(raw)).unwrap()
    }

    #[test]
    fn round_trips() {
        let key = test_key();
        let payload = encrypt("sekrit-access-token", &key).unwrap();
        assert_eq!(decrypt(&payload, &key).unwrap(), "sekrit-access-token");
    }

    #[test]
    fn same_plaintext_yields_different_ciphertexts() {
        let key = test_key();
        let a = encrypt("same-token", &key).unwrap();
        let b = encrypt("same-token", &key).unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let key = test_key();
        let mut payload = encrypt("sekrit", &key).unwrap();
        let mut raw = base64_engine.decode(&payload.ciphertext).unwrap();
        raw[0] ^= 0xFF;
        payload.ciphertext = base64_engine.encode(raw);
        assert!(decrypt(&payload, &key).is_err());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let key = test_key();
        let other = VaultKey::from_base64(&base64_engine.encode([9u8; KEY_LEN])).unwrap();
        let payload = encrypt("sekrit", &key).unwrap();
        assert!(decrypt(&payload, &other).is_err());
    }

    #[test]
    fn rejects_key_of_wrong_length() {
        let short = base64_engine.encode([1u8; 16]);
        assert!(VaultKey::from_base64(&short).is_err());
    }
}
