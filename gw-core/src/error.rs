use thiserror::Error;

/// Top-level error taxonomy shared by every gateway crate.
///
/// Mirrors `adk-mistralrs::MistralRsError`'s shape: one flat enum, a
/// `category()` classifier used for metrics labeling, and a transparent
/// `Other` arm reserved for crate boundaries (never matched on by callers).
#[derive(Debug, Error)]
pub enum GatewayError {
    // -- client input (400) --
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("unknown model: {0}")]
    UnknownModel(String),

    // -- authentication (401 / 503) --
    #[error("unauthorized: invalid authorization header")]
    MissingBearer,
    #[error("unauthorized: invalid authorization header")]
    MalformedBearer,
    #[error("unauthorized: invalid token")]
    InvalidSignature,
    #[error("unauthorized: invalid token")]
    Expired,
    #[error("unauthorized: invalid token")]
    UnknownIssuer,
    #[error("unauthorized: invalid token")]
    Revoked,
    #[error("upstream identity provider unavailable")]
    UpstreamUnavailable,
    #[error("unknown signing key")]
    UnknownKey,

    // -- authorization (403) --
    #[error("forbidden")]
    Forbidden,

    // -- rate / flow control (429 / 503) --
    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },
    #[error("circuit breaker open for operation {operation}")]
    CircuitOpen {
        operation: String,
        retry_after_secs: u64,
    },
    #[error("too many concurrent requests for operation {operation}")]
    TooManyRequests { operation: String },

    // -- resource (404) --
    #[error("not found: {0}")]
    NotFound(String),

    // -- upstream agent / transport --
    #[error("agent error: {0}")]
    AgentUnavailable(String),

    // -- timeouts --
    #[error("request deadline exceeded")]
    Timeout,

    // -- persistence (500) --
    #[error("storage error: {0}")]
    Storage(String),

    // -- fatal / startup --
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GatewayError {
    /// Stable, low-cardinality label for metrics and audit events. Never
    /// exposed verbatim to callers — see [`GatewayError::public_message`].
    pub fn category(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "validation",
            GatewayError::UnknownModel(_) => "unknown_model",
            GatewayError::MissingBearer => "missing_bearer",
            GatewayError::MalformedBearer => "malformed_bearer",
            GatewayError::InvalidSignature => "invalid_signature",
            GatewayError::Expired => "expired",
            GatewayError::UnknownIssuer => "unknown_issuer",
            GatewayError::Revoked => "revoked",
            GatewayError::UpstreamUnavailable => "upstream_unavailable",
            GatewayError::UnknownKey => "unknown_key",
            GatewayError::Forbidden => "forbidden",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::CircuitOpen { .. } => "circuit_breaker_open",
            GatewayError::TooManyRequests { .. } => "too_many_requests",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::AgentUnavailable(_) => "agent_unavailable",
            GatewayError::Timeout => "timeout",
            GatewayError::Storage(_) => "storage",
            GatewayError::Config(_) => "config",
            GatewayError::Other(_) => "internal",
        }
    }

    /// HTTP status code this error maps to at the edge (spec §7).
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Validation(_) | GatewayError::UnknownModel(_) => 400,
            GatewayError::MissingBearer
            | GatewayError::MalformedBearer
            | GatewayError::InvalidSignature
            | GatewayError::Expired
            | GatewayError::UnknownIssuer
            | GatewayError::Revoked => 401,
            GatewayError::UpstreamUnavailable => 503,
            GatewayError::UnknownKey => 401,
            GatewayError::Forbidden => 403,
            GatewayError::RateLimited { .. } => 429,
            GatewayError::CircuitOpen { .. } => 503,
            GatewayError::TooManyRequests { .. } => 429,
            GatewayError::NotFound(_) => 404,
            GatewayError::AgentUnavailable(_) => 503,
            GatewayError::Timeout => 504,
            GatewayError::Storage(_) => 500,
            GatewayError::Config(_) => 500,
            GatewayError::Other(_) => 500,
        }
    }

    /// User-visible message. Authentication failures are deliberately
    /// vague — never reveal which step of the credential chain matched
    /// or failed (spec §4.2, §7).
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::MissingBearer | GatewayError::MalformedBearer => {
                "unauthorized: invalid authorization header".to_string()
            }
            GatewayError::InvalidSignature
            | GatewayError::Expired
            | GatewayError::UnknownIssuer
            | GatewayError::Revoked
            | GatewayError::UnknownKey => "unauthorized: invalid token".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_401() {
        assert_eq!(GatewayError::MissingBearer.status_code(), 401);
        assert_eq!(GatewayError::InvalidSignature.status_code(), 401);
        assert_eq!(GatewayError::UpstreamUnavailable.status_code(), 503);
    }

    #[test]
    fn auth_errors_never_leak_which_step_failed() {
        assert_eq!(
            GatewayError::InvalidSignature.public_message(),
            GatewayError::Expired.public_message()
        );
        assert_eq!(
            GatewayError::InvalidSignature.public_message(),
            "unauthorized: invalid token"
        );
    }

    #[test]
    fn circuit_open_carries_retry_after() {
        let err = GatewayError::CircuitOpen {
            operation: "call_tool".to_string(),
            retry_after_secs: 30,
        };
        assert_eq!(err.status_code(), 503);
        assert_eq!(err.category(), "circuit_breaker_open");
    }
}
