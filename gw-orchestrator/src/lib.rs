//! Selects the primary/fallback agent for a completion and manages
//! streaming fan-out under circuit-breaker protection (spec §4.7, C7).

mod metrics;
mod orchestrator;

pub use metrics::{MetricsRecorder, NoopMetricsRecorder};
pub use orchestrator::Orchestrator;
