//! HTTP adapter for the gateway (spec §4.8 C8, §4.13 C13): the chat
//! handler, models/sessions reads, MCP OAuth endpoints, platform-admin
//! reads, and health/metrics, all wired together in [`router::build_router`].

pub mod error;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod state;

pub use router::build_router;
pub use state::{AppState, Readiness, StorageClient};
