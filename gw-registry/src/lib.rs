//! Live agent handles, model resolution, and health checks (spec §4.6, C6).

mod agent;
mod http_agent;
mod registry;

pub use agent::{Agent, AgentChunk, AgentChunkStream, AgentParams, AgentResponse};
pub use http_agent::HttpAgent;
pub use registry::AgentRegistry;
