//! Metrics sample emission (spec §4.7 step 4: "a metrics sample (latency,
//! tokens, model, outcome)"). `gw-server` supplies the concrete recorder
//! that feeds the `/metrics` scrape endpoint (C13); this crate only needs
//! the capability, not the exposition format.

use gw_core::Usage;
use std::time::Duration;

pub trait MetricsRecorder: Send + Sync {
    fn record_completion(&self, model: &str, outcome: &str, latency: Duration, usage: &Usage);
}

/// Used when no recorder is wired up (tests, or a server built without
/// `/metrics` enabled). Logs at debug level so the sample isn't silently
/// lost.
pub struct NoopMetricsRecorder;

impl MetricsRecorder for NoopMetricsRecorder {
    fn record_completion(&self, model: &str, outcome: &str, latency: Duration, usage: &Usage) {
        tracing::debug!(
            model,
            outcome,
            latency_ms = latency.as_millis() as u64,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "completion metrics sample"
        );
    }
}
