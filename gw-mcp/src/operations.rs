//! Breaker-guarded dispatch (spec §4.11: "All MCP transport calls are
//! wrapped by their class's breaker"). Each of the five operation classes
//! gets its own [`gw_breaker::CircuitBreaker`] per server, keyed
//! `"mcp:{class}:{owner}:{name}"` so one server's failures never trip
//! another server's breaker.

use crate::error::McpError;
use crate::transport::{McpToolInfo, McpTransport};
use gw_breaker::{BreakerError, BreakerRegistry};
use gw_core::GatewayError;
use serde_json::Value;
use std::sync::Arc;

fn breaker_key(class: &str, owner: &str, name: &str) -> String {
    format!("mcp:{class}:{owner}:{name}")
}

fn map_breaker_error(err: BreakerError<McpError>) -> GatewayError {
    match err {
        BreakerError::Open { operation, retry_after_secs } => {
            GatewayError::CircuitOpen { operation, retry_after_secs }
        }
        BreakerError::TooManyRequests { operation } => GatewayError::TooManyRequests { operation },
        BreakerError::OperationFailed(e) => e.into(),
    }
}

/// Runs every MCP transport call for one server through its per-class
/// breaker (spec §4.11).
pub struct McpOperations {
    breakers: Arc<BreakerRegistry>,
}

impl McpOperations {
    pub fn new(breakers: Arc<BreakerRegistry>) -> Self {
        Self { breakers }
    }

    pub async fn connect(
        &self,
        owner: &str,
        name: &str,
        transport: &dyn McpTransport,
    ) -> Result<(), GatewayError> {
        let breaker = self.breakers.get_or_create(&breaker_key("connect", owner, name));
        breaker.run(transport.connect()).await.map_err(map_breaker_error)
    }

    pub async fn list_tools(
        &self,
        owner: &str,
        name: &str,
        transport: &dyn McpTransport,
    ) -> Result<Vec<McpToolInfo>, GatewayError> {
        let breaker = self.breakers.get_or_create(&breaker_key("list_tools", owner, name));
        breaker.run(transport.list_tools()).await.map_err(map_breaker_error)
    }

    pub async fn call_tool(
        &self,
        owner: &str,
        name: &str,
        transport: &dyn McpTransport,
        tool: &str,
        args: Value,
    ) -> Result<Value, GatewayError> {
        let breaker = self.breakers.get_or_create(&breaker_key("call_tool", owner, name));
        breaker
            .run(transport.call_tool(tool, args))
            .await
            .map_err(map_breaker_error)
    }

    pub async fn disconnect(
        &self,
        owner: &str,
        name: &str,
        transport: &dyn McpTransport,
    ) -> Result<(), GatewayError> {
        let breaker = self.breakers.get_or_create(&breaker_key("disconnect", owner, name));
        breaker.run(transport.disconnect()).await.map_err(map_breaker_error)
    }

    pub async fn test_connection(
        &self,
        owner: &str,
        name: &str,
        transport: &dyn McpTransport,
    ) -> Result<(), GatewayError> {
        let breaker = self.breakers.get_or_create(&breaker_key("test_connection", owner, name));
        breaker
            .run(transport.test_connection())
            .await
            .map_err(map_breaker_error)
    }
}
