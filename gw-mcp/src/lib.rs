//! MCP (Model-Context-Protocol) subsystem (spec §4.11, C11): validates
//! server configs, drives the five breaker-guarded operation classes
//! against a server's transport, and runs the OAuth PKCE+state connection
//! flow backed by the token vault.

mod config;
mod error;
mod oauth;
mod operations;
mod registry;
mod transport;

pub use config::{AuthDescriptor, MCPConfig, Transport};
pub use error::McpError;
pub use oauth::{
    InitiateResult, OAuthFlow, OAuthStateRow, OAuthStateStore, ProviderConfig, RestOAuthStateStore,
};
pub use operations::McpOperations;
pub use registry::{McpConfigStore, McpRegistry, RestMcpConfigStore};
pub use transport::{HttpTransport, McpToolInfo, McpTransport, StdioTransport, build_transport};
