//! Declarative description of a downstream MCP endpoint (spec §3
//! MCPConfig, §4.11, C11).
//!
//! The transport-kind shape is grounded on `adk-mistralrs::McpServerSource`
//! (`Http` / `Process` / `WebSocket` variants); this gateway needs `{http,
//! sse, stdio}` per spec §4.11, so `Sse` replaces `WebSocket` and `Process`
//! is renamed `Stdio` to match the spec's vocabulary.

use crate::error::McpError;
use gw_core::{OrgId, PrincipalId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum Transport {
    Http {
        endpoint: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Sse {
        endpoint: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
}

impl Transport {
    pub fn kind(&self) -> &'static str {
        match self {
            Transport::Http { .. } => "http",
            Transport::Sse { .. } => "sse",
            Transport::Stdio { .. } => "stdio",
        }
    }
}

/// How the server authenticates to the upstream MCP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthDescriptor {
    /// No authentication required.
    None,
    /// A fixed bearer token configured alongside the server.
    StaticBearer { token: String },
    /// Per-user OAuth tokens held in the token vault, keyed by provider id
    /// (spec §4.11's connect/callback/refresh/revoke flow).
    OAuth { provider: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MCPConfig {
    pub owner: PrincipalId,
    pub org_id: OrgId,
    pub name: String,
    pub transport: Transport,
    pub auth: AuthDescriptor,
    pub active: bool,
}

impl MCPConfig {
    /// Structural validation (spec §3: name non-empty, transport carries
    /// the endpoint/command its kind requires). Uniqueness of
    /// `(owner, name)` is enforced by the registry, not here, since it
    /// requires looking at sibling configs.
    pub fn validate(&self) -> Result<(), McpError> {
        if self.name.trim().is_empty() {
            return Err(McpError::InvalidConfig("name must not be empty".to_string()));
        }
        match &self.transport {
            Transport::Http { endpoint, .. } | Transport::Sse { endpoint, .. } => {
                if endpoint.trim().is_empty() {
                    return Err(McpError::InvalidConfig(
                        "http/sse transport requires a non-empty endpoint".to_string(),
                    ));
                }
                if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                    return Err(McpError::InvalidConfig(
                        "http/sse endpoint must be an http(s) url".to_string(),
                    ));
                }
            }
            Transport::Stdio { command, .. } => {
                if command.trim().is_empty() {
                    return Err(McpError::InvalidConfig(
                        "stdio transport requires a non-empty command".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(transport: Transport) -> MCPConfig {
        MCPConfig {
            owner: PrincipalId::from("u-1".to_string()),
            org_id: OrgId::from("org-1".to_string()),
            name: "filesystem-tools".to_string(),
            transport,
            auth: AuthDescriptor::None,
            active: true,
        }
    }

    #[test]
    fn accepts_well_formed_http_config() {
        let config = base_config(Transport::Http {
            endpoint: "https://mcp.example.com".to_string(),
            headers: HashMap::new(),
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        let mut config = base_config(Transport::Http {
            endpoint: "https://mcp.example.com".to_string(),
            headers: HashMap::new(),
        });
        config.name = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let config = base_config(Transport::Sse {
            endpoint: "not-a-url".to_string(),
            headers: HashMap::new(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_stdio_command() {
        let config = base_config(Transport::Stdio {
            command: "".to_string(),
            args: vec![],
            env: HashMap::new(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn transport_kind_matches_spec_vocabulary() {
        assert_eq!(
            Transport::Http { endpoint: String::new(), headers: HashMap::new() }.kind(),
            "http"
        );
        assert_eq!(
            Transport::Sse { endpoint: String::new(), headers: HashMap::new() }.kind(),
            "sse"
        );
        assert_eq!(
            Transport::Stdio { command: String::new(), args: vec![], env: HashMap::new() }.kind(),
            "stdio"
        );
    }
}
