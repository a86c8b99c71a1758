//! Prometheus exposition for the `/metrics` endpoint (C13). The rest of
//! the workspace only needs the *capability* to record a sample
//! (`gw_orchestrator::MetricsRecorder`); this is the one crate that picks
//! an exposition format, the way `rexlunae-RustyClaw`'s `metrics` module
//! does for its gateway. Unlike that module this registry is an owned
//! value rather than a `lazy_static` global, matching the
//! no-singletons stance the rest of this workspace takes with
//! `BreakerRegistry` / `AgentRegistry` / `KeyCache`.

use gw_breaker::BreakerRegistry;
use gw_core::Usage;
use gw_orchestrator::MetricsRecorder;
use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

pub struct GatewayMetrics {
    registry: Registry,
    completions_total: IntCounterVec,
    completion_latency_seconds: HistogramVec,
    prompt_tokens_total: IntCounterVec,
    completion_tokens_total: IntCounterVec,
    breakers_open: IntGauge,
    breakers: Arc<BreakerRegistry>,
}

impl GatewayMetrics {
    pub fn new(breakers: Arc<BreakerRegistry>) -> Self {
        let registry = Registry::new();

        let completions_total = IntCounterVec::new(
            prometheus::Opts::new(
                "gateway_chat_completions_total",
                "Total chat completion requests by model and outcome",
            ),
            &["model", "outcome"],
        )
        .expect("valid metric spec");

        let completion_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "gateway_chat_completion_latency_seconds",
                "Chat completion latency in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
            &["model", "outcome"],
        )
        .expect("valid metric spec");

        let prompt_tokens_total = IntCounterVec::new(
            prometheus::Opts::new("gateway_prompt_tokens_total", "Total prompt tokens processed"),
            &["model"],
        )
        .expect("valid metric spec");

        let completion_tokens_total = IntCounterVec::new(
            prometheus::Opts::new(
                "gateway_completion_tokens_total",
                "Total completion tokens generated",
            ),
            &["model"],
        )
        .expect("valid metric spec");

        let breakers_open = IntGauge::new(
            "gateway_circuit_breakers_open",
            "Number of circuit breakers currently in the open state",
        )
        .expect("valid metric spec");

        registry.register(Box::new(completions_total.clone())).expect("register");
        registry
            .register(Box::new(completion_latency_seconds.clone()))
            .expect("register");
        registry.register(Box::new(prompt_tokens_total.clone())).expect("register");
        registry
            .register(Box::new(completion_tokens_total.clone()))
            .expect("register");
        registry.register(Box::new(breakers_open.clone())).expect("register");

        Self {
            registry,
            completions_total,
            completion_latency_seconds,
            prompt_tokens_total,
            completion_tokens_total,
            breakers_open,
            breakers,
        }
    }

    /// Renders the text exposition format (spec C13, `/metrics`). Refreshes
    /// the open-breaker gauge at scrape time since `BreakerRegistry` has no
    /// push-based transition hook wired in this server.
    pub async fn encode(&self) -> String {
        self.breakers_open.set(self.breakers.open_count().await as i64);

        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .unwrap_or_else(|e| tracing::warn!(error = %e, "failed to encode metrics"));
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl MetricsRecorder for GatewayMetrics {
    fn record_completion(&self, model: &str, outcome: &str, latency: Duration, usage: &Usage) {
        self.completions_total.with_label_values(&[model, outcome]).inc();
        self.completion_latency_seconds
            .with_label_values(&[model, outcome])
            .observe(latency.as_secs_f64());
        self.prompt_tokens_total
            .with_label_values(&[model])
            .inc_by(usage.prompt_tokens as u64);
        self.completion_tokens_total
            .with_label_values(&[model])
            .inc_by(usage.completion_tokens as u64);
    }
}
