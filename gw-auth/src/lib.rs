//! Layered credential validation (C2) and tiered access enforcement (C3)
//! for the gateway (spec §4.2, §4.3).

mod error;
mod middleware;
mod stores;
mod validator;

pub use error::AuthError;
pub use middleware::{enforce_tier, AccessTier, AuthenticatedPrincipal};
pub use stores::{ApiKeyRecord, ApiKeyStore, PrincipalLookup, RestApiKeyStore, RestPrincipalLookup};
pub use validator::CredentialValidator;
