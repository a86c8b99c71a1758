use gw_core::GatewayError;
use thiserror::Error;

/// Internal MCP-subsystem error. Converted to [`GatewayError`] at the
/// crate boundary so callers only ever see the shared taxonomy.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("mcp config validation failed: {0}")]
    InvalidConfig(String),

    #[error("mcp server not found: {0}")]
    NotFound(String),

    #[error("an mcp server named '{0}' already exists for this owner")]
    DuplicateName(String),

    #[error("oauth state is invalid, expired, or already used")]
    InvalidOAuthState,

    #[error("oauth token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl McpError {
    pub fn category(&self) -> &'static str {
        match self {
            McpError::InvalidConfig(_) => "invalid_config",
            McpError::NotFound(_) => "not_found",
            McpError::DuplicateName(_) => "duplicate_name",
            McpError::InvalidOAuthState => "invalid_oauth_state",
            McpError::TokenExchangeFailed(_) => "token_exchange_failed",
            McpError::Transport(_) => "transport",
            McpError::Storage(_) => "storage",
        }
    }
}

impl From<McpError> for GatewayError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::InvalidConfig(detail) => GatewayError::Validation(detail),
            McpError::NotFound(id) => GatewayError::NotFound(id),
            McpError::DuplicateName(name) => {
                GatewayError::Validation(format!("duplicate mcp server name: {name}"))
            }
            McpError::InvalidOAuthState => {
                GatewayError::Validation("invalid oauth state".to_string())
            }
            McpError::TokenExchangeFailed(detail) => GatewayError::AgentUnavailable(detail),
            McpError::Transport(detail) => GatewayError::AgentUnavailable(detail),
            McpError::Storage(detail) => GatewayError::Storage(detail),
        }
    }
}
