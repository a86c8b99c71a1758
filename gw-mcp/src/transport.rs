//! Wire-level dispatch to a single MCP server (spec §4.11: "five
//! operation classes ... connect, list_tools, call_tool, disconnect,
//! test_connection"). The concrete JSON-RPC framing is this gateway's own
//! choice — spec §1 excludes only "the OAuth-provider-specific
//! token-endpoint formats" and upstream *agent* subprocess protocols from
//! scope, not the MCP wire format itself.

use crate::config::Transport;
use crate::error::McpError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct McpToolInfo {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn connect(&self) -> Result<(), McpError>;
    async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError>;
    async fn call_tool(&self, tool: &str, args: Value) -> Result<Value, McpError>;
    async fn disconnect(&self) -> Result<(), McpError>;
    async fn test_connection(&self) -> Result<(), McpError>;
}

fn json_rpc_request(id: u64, method: &str, params: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

fn parse_rpc_result(body: &Value) -> Result<Value, McpError> {
    if let Some(error) = body.get("error") {
        return Err(McpError::Transport(format!("mcp server returned error: {error}")));
    }
    body.get("result")
        .cloned()
        .ok_or_else(|| McpError::Transport("mcp response missing 'result'".to_string()))
}

/// Transport for the `http` and `sse` transport kinds: both speak
/// JSON-RPC over a single HTTP endpoint; `sse` additionally allows the
/// server to push unsolicited notifications, which this gateway does not
/// consume (tool calls are strictly request/response from the caller's
/// perspective).
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    headers: HashMap<String, String>,
    bearer: Option<String>,
}

impl HttpTransport {
    pub fn new(endpoint: String, headers: HashMap<String, String>, bearer: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            headers,
            bearer,
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json_rpc_request(1, method, params));
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(McpError::Transport(format!(
                "mcp http transport returned status {}",
                response.status()
            )));
        }
        let body: Value = response.json().await.map_err(|e| McpError::Transport(e.to_string()))?;
        parse_rpc_result(&body)
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn connect(&self) -> Result<(), McpError> {
        self.call("initialize", serde_json::json!({})).await.map(|_| ())
    }

    async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let result = self.call("tools/list", serde_json::json!({})).await?;
        let tools = result
            .get("tools")
            .and_then(|v| v.as_array())
            .ok_or_else(|| McpError::Transport("tools/list missing 'tools' array".to_string()))?;
        tools
            .iter()
            .map(|t| {
                Ok(McpToolInfo {
                    name: t
                        .get("name")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| McpError::Transport("tool missing 'name'".to_string()))?
                        .to_string(),
                    description: t.get("description").and_then(|v| v.as_str()).map(str::to_string),
                    input_schema: t.get("inputSchema").cloned().unwrap_or(Value::Null),
                })
            })
            .collect()
    }

    async fn call_tool(&self, tool: &str, args: Value) -> Result<Value, McpError> {
        self.call("tools/call", serde_json::json!({ "name": tool, "arguments": args }))
            .await
    }

    async fn disconnect(&self) -> Result<(), McpError> {
        // Stateless HTTP transport: nothing to tear down server-side.
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), McpError> {
        self.call("ping", serde_json::json!({})).await.map(|_| ())
    }
}

/// Transport for the `stdio` kind: spawns the configured command and
/// speaks newline-delimited JSON-RPC over its stdin/stdout, grounded on
/// `adk-mistralrs::McpServerSource::Process`'s command/args/env shape.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl StdioTransport {
    pub fn new(command: String, args: Vec<String>, env: HashMap<String, String>) -> Self {
        Self { command, args, env }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| McpError::Transport(format!("failed to spawn mcp process: {e}")))?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            McpError::Transport("mcp process has no stdin handle".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            McpError::Transport("mcp process has no stdout handle".to_string())
        })?;
        let mut reader = BufReader::new(stdout);

        let request = json_rpc_request(1, method, params);
        let mut line = serde_json::to_string(&request)
            .map_err(|e| McpError::Transport(e.to_string()))?;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| McpError::Transport(format!("failed to write to mcp process: {e}")))?;
        stdin
            .shutdown()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let mut response_line = String::new();
        reader
            .read_line(&mut response_line)
            .await
            .map_err(|e| McpError::Transport(format!("failed to read mcp process output: {e}")))?;

        let _ = child.kill().await;

        let body: Value = serde_json::from_str(response_line.trim())
            .map_err(|e| McpError::Transport(format!("malformed mcp process response: {e}")))?;
        parse_rpc_result(&body)
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn connect(&self) -> Result<(), McpError> {
        self.call("initialize", serde_json::json!({})).await.map(|_| ())
    }

    async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let result = self.call("tools/list", serde_json::json!({})).await?;
        let tools = result
            .get("tools")
            .and_then(|v| v.as_array())
            .ok_or_else(|| McpError::Transport("tools/list missing 'tools' array".to_string()))?;
        tools
            .iter()
            .map(|t| {
                Ok(McpToolInfo {
                    name: t
                        .get("name")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| McpError::Transport("tool missing 'name'".to_string()))?
                        .to_string(),
                    description: t.get("description").and_then(|v| v.as_str()).map(str::to_string),
                    input_schema: t.get("inputSchema").cloned().unwrap_or(Value::Null),
                })
            })
            .collect()
    }

    async fn call_tool(&self, tool: &str, args: Value) -> Result<Value, McpError> {
        self.call("tools/call", serde_json::json!({ "name": tool, "arguments": args }))
            .await
    }

    async fn disconnect(&self) -> Result<(), McpError> {
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), McpError> {
        self.call("ping", serde_json::json!({})).await.map(|_| ())
    }
}

/// Builds the transport implementation for a config's declared kind.
pub fn build_transport(
    transport: &Transport,
    bearer: Option<String>,
) -> Box<dyn McpTransport> {
    match transport {
        Transport::Http { endpoint, headers } | Transport::Sse { endpoint, headers } => {
            Box::new(HttpTransport::new(endpoint.clone(), headers.clone(), bearer))
        }
        Transport::Stdio { command, args, env } => {
            Box::new(StdioTransport::new(command.clone(), args.clone(), env.clone()))
        }
    }
}
