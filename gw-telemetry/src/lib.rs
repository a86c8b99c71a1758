//! Structured logging and request-scoped tracing for the gateway.

mod context;
mod init;

pub use context::RequestContext;
pub use init::{init, TelemetryConfig};
