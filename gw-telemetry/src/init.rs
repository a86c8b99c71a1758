use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Telemetry configuration. Construct with [`TelemetryConfig::from_env`]
/// in the binary's `main`; use [`TelemetryConfig::new`] directly in tests.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub otlp_endpoint: Option<String>,
    pub default_level: Option<String>,
    pub json: bool,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_otlp(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = Some(level.into());
        self
    }

    /// Loads configuration from the process environment:
    /// - `SERVICE_NAME` (default `"gw-server"`)
    /// - `OTLP_ENDPOINT` (optional, requires the `otlp` feature to take effect)
    /// - `LOG_LEVEL` (default `"info"`)
    /// - `LOG_FORMAT=json` switches the console layer to JSON output
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("SERVICE_NAME").unwrap_or_else(|_| "gw-server".to_string()),
            otlp_endpoint: std::env::var("OTLP_ENDPOINT").ok(),
            default_level: std::env::var("LOG_LEVEL").ok(),
            json: std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false),
        }
    }
}

/// Initializes the global `tracing` subscriber. Idempotent: subsequent
/// calls (e.g. from multiple `#[tokio::test]`s in one binary) are no-ops.
pub fn init(config: TelemetryConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(config.default_level.as_deref().unwrap_or("info")))
            .expect("failed to build log filter");

        let registry = tracing_subscriber::registry().with(filter);

        if config.json {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true);
            registry.with(fmt_layer).init();
        } else {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true);
            registry.with(fmt_layer).init();
        }

        tracing::info!(
            service.name = config.service_name,
            otlp.enabled = config.otlp_endpoint.is_some(),
            "telemetry initialized"
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init(TelemetryConfig::new("test-service"));
        init(TelemetryConfig::new("test-service"));
    }
}
