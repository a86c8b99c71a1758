//! Gateway process entry point: loads configuration, wires every
//! collaborator crate together into an [`gw_server::AppState`], serves the
//! HTTP surface, and runs the background loops the spec calls for (agent
//! health probing, expired-OAuth-state sweeping) alongside it.
//!
//! Exit codes (spec §7): `0` normal shutdown, `1` configuration error,
//! `2` readiness did not complete within the startup deadline.

use gw_audit::{AuditLogger, RestAuditWriter};
use gw_auth::{CredentialValidator, RestApiKeyStore, RestPrincipalLookup};
use gw_breaker::BreakerRegistry;
use gw_core::AgentName;
use gw_keys::KeyCache;
use gw_mcp::{OAuthFlow, ProviderConfig, RestOAuthStateStore};
use gw_orchestrator::Orchestrator;
use gw_ratelimit::{FredKvStore, KvStore, RateLimiter};
use gw_registry::{AgentRegistry, HttpAgent};
use gw_server::state::{Readiness, StorageClient};
use gw_server::{AppState, build_router};
use gw_session::RestSessionStore;
use gw_telemetry::TelemetryConfig;
use gw_vault::{RestOAuthTokenStore, TokenVault, VaultKey};
use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// How often background agent health probes run, independent of the
/// per-request `ensure_fresh_health` staleness check (spec §4.13).
const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// How often expired `oauth_states` rows are swept (spec §3: "Cleaned by
/// a periodic sweep").
const OAUTH_STATE_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Upper bound on how long startup waits for `/ready` to go green before
/// giving up and exiting (spec §7).
const READINESS_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start tokio runtime: {e}");
            return ExitCode::from(1);
        }
    };

    runtime.block_on(run())
}

async fn run() -> ExitCode {
    let config = match gw_config::AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    gw_telemetry::init(TelemetryConfig::from_env());
    tracing::info!(port = config.http_port, "starting gateway");

    let storage = StorageClient::new(
        config.storage.rest_endpoint.clone(),
        config.storage.service_role_credential.clone(),
    );

    let mut kv_connected = false;
    let kv_store: Option<Arc<dyn KvStore>> = match &config.kv {
        Some(kv) => match build_fred_client(&kv.url, &kv.token).await {
            Ok(client) => {
                kv_connected = true;
                Some(Arc::new(FredKvStore::new(client)) as Arc<dyn KvStore>)
            }
            Err(e) => {
                tracing::warn!(error = %e, "kv store unreachable at startup, starting without it");
                None
            }
        },
        None => None,
    };

    let key_cache = Arc::new(KeyCache::with_http_fetcher());
    let api_keys = Arc::new(RestApiKeyStore::new(
        config.storage.rest_endpoint.clone(),
        config.storage.service_role_credential.clone(),
    ));
    let principals = Arc::new(RestPrincipalLookup::new(
        config.storage.rest_endpoint.clone(),
        config.storage.service_role_credential.clone(),
    ));
    let validator = Arc::new(CredentialValidator::new(
        config.static_credential.clone(),
        api_keys,
        config.issuers.clone(),
        key_cache,
        principals,
    ));

    let rate_limiter = Arc::new(RateLimiter::new(
        gw_ratelimit::RateLimitConfig {
            requests_per_minute: config.rate_limit.requests_per_minute,
            burst: config.rate_limit.burst,
        },
        kv_store,
    ));

    let breakers = Arc::new(BreakerRegistry::new(gw_breaker::BreakerConfig {
        failure_threshold: config.breaker.failure_threshold,
        success_threshold: config.breaker.success_threshold,
        open_duration: config.breaker.open_duration,
        half_open_permits: config.breaker.half_open_permits,
    }));

    let primary_name = AgentName::from(config.agents.primary_name.clone());
    let registry = Arc::new(AgentRegistry::new(primary_name.clone()));
    for (name, endpoint) in &config.agents.endpoints {
        registry.register(
            AgentName::from(name.clone()),
            Arc::new(HttpAgent::new(name.clone(), endpoint.clone())),
        );
    }
    registry.rebuild_model_index().await;

    // spec §7: "a literal agent named fallback stands in as the secondary
    // route when fallback is enabled" — there's no dedicated config field
    // naming the fallback agent, so the convention is the registration
    // name itself (see DESIGN.md).
    let fallback_agent = if config.agents.fallback_enabled {
        config
            .agents
            .endpoint_for("fallback")
            .map(|_| AgentName::from("fallback".to_string()))
    } else {
        None
    };

    let audit_writer = Arc::new(RestAuditWriter::new(
        config.storage.rest_endpoint.clone(),
        config.storage.service_role_credential.clone(),
    ));
    let audit = AuditLogger::spawn(audit_writer, None);

    let metrics = Arc::new(gw_server::metrics::GatewayMetrics::new(breakers.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        registry.clone(),
        breakers.clone(),
        Arc::new(audit.clone()),
        metrics.clone(),
        fallback_agent,
        config.timeouts.completion_deadline,
    ));

    let sessions = Arc::new(RestSessionStore::new(
        config.storage.rest_endpoint.clone(),
        config.storage.service_role_credential.clone(),
    ));

    let vault_key = VaultKey::from_bytes(config.token_encryption_key);
    let token_store = Box::new(RestOAuthTokenStore::new(
        config.storage.rest_endpoint.clone(),
        config.storage.service_role_credential.clone(),
    ));
    let vault = Arc::new(TokenVault::new(token_store, vault_key));
    let oauth_state_store = Box::new(RestOAuthStateStore::new(
        config.storage.rest_endpoint.clone(),
        config.storage.service_role_credential.clone(),
    ));
    let mcp_providers: HashMap<String, ProviderConfig> = config
        .mcp_oauth_providers
        .iter()
        .map(|(name, provider)| {
            (
                name.clone(),
                ProviderConfig {
                    authorize_url: provider.authorize_url.clone(),
                    token_url: provider.token_url.clone(),
                    revoke_url: provider.revoke_url.clone(),
                    client_id: provider.client_id.clone(),
                    client_secret: provider.client_secret.clone(),
                    scopes: provider.scopes.clone(),
                },
            )
        })
        .collect();
    let oauth_flow = Arc::new(OAuthFlow::new(
        oauth_state_store,
        vault,
        audit.clone(),
        mcp_providers,
    ));

    let readiness = Arc::new(Readiness::new(config.kv.is_some()));
    if kv_connected {
        readiness.mark_kv_ready();
    }

    let state = AppState {
        validator,
        rate_limiter,
        breakers: breakers.clone(),
        registry: registry.clone(),
        orchestrator,
        sessions,
        audit: Arc::new(audit.clone()),
        oauth_flow: oauth_flow.clone(),
        storage: storage.clone(),
        readiness: readiness.clone(),
        metrics,
        max_body_bytes: 10 * 1024 * 1024,
        cors_origins: env_cors_origins(),
    };

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", config.http_port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, port = config.http_port, "failed to bind listener");
            return ExitCode::from(1);
        }
    };

    spawn_readiness_probes(storage, registry.clone(), readiness.clone());
    spawn_health_probe_loop(registry);
    spawn_oauth_sweep_loop(oauth_flow);

    if tokio::time::timeout(READINESS_TIMEOUT, wait_until_ready(&readiness))
        .await
        .is_err()
    {
        tracing::error!("readiness checks did not complete within the startup deadline");
        return ExitCode::from(2);
    }

    let router = build_router(state);
    tracing::info!(port = config.http_port, "gateway listening");

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server exited with error");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

async fn wait_until_ready(readiness: &Readiness) {
    while !readiness.all_ready() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Runs each required startup probe exactly once, in the background, so a
/// slow-to-come-up collaborator doesn't block the others (spec §4.13).
fn spawn_readiness_probes(
    storage: StorageClient,
    registry: Arc<AgentRegistry>,
    readiness: Arc<Readiness>,
) {
    tokio::spawn(async move {
        if storage.ping().await {
            readiness.mark_storage_ready();
        } else {
            tracing::warn!("storage not reachable during startup probe");
        }
    });
    tokio::spawn(async move {
        registry.probe_all().await;
        readiness.mark_agents_ready();
    });
    // kv readiness is marked by the caller when no kv store is configured
    // (Readiness::kv_ready treats "not configured" as satisfied); when one
    // is configured the first successful rate-limiter check marks it, so
    // nothing further is spawned here.
}

fn spawn_health_probe_loop(registry: Arc<AgentRegistry>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEALTH_PROBE_INTERVAL);
        loop {
            interval.tick().await;
            registry.probe_all().await;
        }
    });
}

/// Periodically deletes expired `oauth_states` rows (spec §3: "Cleaned by
/// a periodic sweep").
fn spawn_oauth_sweep_loop(oauth_flow: Arc<OAuthFlow>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(OAUTH_STATE_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match oauth_flow.sweep_expired_state().await {
                Ok(count) if count > 0 => {
                    tracing::info!(rows_deleted = count, "swept expired oauth states")
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "oauth state sweep failed"),
            }
        }
    });
}

fn env_cors_origins() -> Vec<String> {
    std::env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

async fn build_fred_client(url: &str, token: &str) -> Result<fred::clients::Client, fred::error::Error> {
    use fred::prelude::*;

    let mut config = Config::from_url(url)?;
    if !token.is_empty() {
        config.password = Some(token.to_string());
    }
    let client = Builder::from_config(config).build()?;
    client.init().await?;
    Ok(client)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
