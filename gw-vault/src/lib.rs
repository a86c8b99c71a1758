//! Encrypted OAuth token storage for downstream MCP providers (spec §4.12,
//! C12): AES-256-GCM at rest, decrypted only inside the call that needs
//! the plaintext.

mod crypto;
mod error;
mod store;

pub use crypto::{EncryptedPayload, VaultKey, decrypt, encrypt};
pub use error::VaultError;
pub use store::{
    DEFAULT_REFRESH_THRESHOLD_SECS, OAuthTokenStore, RestOAuthTokenStore, TokenMaterial, TokenVault,
};
