use gw_core::GatewayError;
use thiserror::Error;

/// Internal chain-step error. Converted to the crate-wide [`GatewayError`]
/// at the validator boundary; never surfaced to callers directly.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer")]
    MissingBearer,
    #[error("malformed bearer")]
    MalformedBearer,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("expired")]
    Expired,
    #[error("unknown issuer")]
    UnknownIssuer,
    #[error("revoked")]
    Revoked,
    #[error("upstream identity provider unavailable")]
    UpstreamUnavailable,
    #[error("unknown signing key")]
    UnknownKey,
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingBearer => GatewayError::MissingBearer,
            AuthError::MalformedBearer => GatewayError::MalformedBearer,
            AuthError::InvalidSignature => GatewayError::InvalidSignature,
            AuthError::Expired => GatewayError::Expired,
            AuthError::UnknownIssuer => GatewayError::UnknownIssuer,
            AuthError::Revoked => GatewayError::Revoked,
            AuthError::UpstreamUnavailable => GatewayError::UpstreamUnavailable,
            AuthError::UnknownKey => GatewayError::UnknownKey,
        }
    }
}
