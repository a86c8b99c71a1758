//! Loads the gateway's process-environment configuration (spec §6) into a
//! single validated [`AppConfig`], following the `from_env()` convention
//! used throughout this codebase's telemetry and session layers.

mod error;

pub use error::ConfigError;

use std::time::Duration;

/// The `STATIC_API_KEY` credential and its accompanying principal fields.
/// Development / machine-to-machine use only (spec §4.2 step 1).
#[derive(Debug, Clone)]
pub struct StaticCredentialConfig {
    pub key: String,
    pub user_id: String,
    pub org_id: String,
    pub email: String,
    pub name: String,
}

/// One configured signed-token issuer (spec §4.2 step 3).
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    pub id: &'static str,
    pub jwks_url: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub rest_endpoint: String,
    pub service_role_credential: String,
}

#[derive(Debug, Clone)]
pub struct KvConfig {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub primary_name: String,
    pub fallback_enabled: bool,
    /// Executable path or endpoint URL, keyed by agent name.
    pub endpoints: Vec<(String, String)>,
}

impl AgentConfig {
    pub fn endpoint_for(&self, agent_name: &str) -> Option<&str> {
        self.endpoints
            .iter()
            .find(|(name, _)| name == agent_name)
            .map(|(_, endpoint)| endpoint.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_duration: Duration,
    pub half_open_permits: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration: Duration::from_secs(30),
            half_open_permits: 100,
        }
    }
}

/// One configured MCP OAuth provider (spec §4.11 step 1: "the mapping from
/// provider id to authorization endpoint is configured"). The exact
/// token-endpoint wire format is out of scope (spec §1); only these
/// endpoint/credential facts are needed to drive the PKCE/state flow.
#[derive(Debug, Clone)]
pub struct McpProviderConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub revoke_url: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    pub completion_deadline: Duration,
    pub mcp_call_deadline: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            completion_deadline: Duration::from_secs(5 * 60),
            mcp_call_deadline: Duration::from_secs(30),
        }
    }
}

/// Fully validated process configuration. Construction (`from_env`) fails
/// fast with [`ConfigError`] — the process must not run with partial auth
/// configuration (spec §7, fatal errors).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub static_credential: Option<StaticCredentialConfig>,
    pub issuers: Vec<IssuerConfig>,
    pub storage: StorageConfig,
    pub kv: Option<KvConfig>,
    pub token_encryption_key: [u8; 32],
    pub agents: AgentConfig,
    pub mcp_oauth_providers: Vec<(String, McpProviderConfig)>,
    pub rate_limit: RateLimitConfig,
    pub breaker: BreakerConfig,
    pub timeouts: TimeoutConfig,
    pub http_port: u16,
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_required(name: &str) -> Result<String, ConfigError> {
    env_opt(name).ok_or_else(|| ConfigError::MissingRequired(name.to_string()))
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env_opt(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
    }
}

impl AppConfig {
    /// Loads and validates configuration from the process environment.
    /// Does not read a `.env` file itself — callers that want dotenv
    /// loading call `dotenvy::dotenv()` before this, as the teacher's
    /// binaries do.
    pub fn from_env() -> Result<Self, ConfigError> {
        let static_credential = Self::load_static_credential()?;
        let issuers = Self::load_issuers();
        let storage = StorageConfig {
            rest_endpoint: env_required("STORAGE_REST_ENDPOINT")?,
            service_role_credential: env_required("STORAGE_SERVICE_ROLE_CREDENTIAL")?,
        };
        let kv = Self::load_kv();
        let token_encryption_key = Self::load_token_encryption_key()?;
        let agents = Self::load_agents()?;
        let mcp_oauth_providers = Self::load_mcp_oauth_providers();
        let rate_limit = RateLimitConfig {
            requests_per_minute: env_parsed("RATE_LIMIT_RPM", 60)?,
            burst: env_parsed("RATE_LIMIT_BURST", 10)?,
        };
        let breaker = BreakerConfig {
            failure_threshold: env_parsed("BREAKER_FAILURE_THRESHOLD", 5)?,
            success_threshold: env_parsed("BREAKER_SUCCESS_THRESHOLD", 2)?,
            open_duration: Duration::from_secs(env_parsed("BREAKER_OPEN_DURATION_SECS", 30)?),
            half_open_permits: env_parsed("BREAKER_HALF_OPEN_PERMITS", 100)?,
        };
        let timeouts = TimeoutConfig {
            completion_deadline: Duration::from_secs(env_parsed(
                "COMPLETION_DEADLINE_SECS",
                300,
            )?),
            mcp_call_deadline: Duration::from_secs(env_parsed("MCP_CALL_DEADLINE_SECS", 30)?),
        };
        let http_port = env_parsed("HTTP_PORT", 3284)?;

        if static_credential.is_none() && issuers.is_empty() {
            return Err(ConfigError::NoAuthMethodConfigured);
        }

        Ok(Self {
            static_credential,
            issuers,
            storage,
            kv,
            token_encryption_key,
            agents,
            mcp_oauth_providers,
            rate_limit,
            breaker,
            timeouts,
            http_port,
        })
    }

    fn load_static_credential() -> Result<Option<StaticCredentialConfig>, ConfigError> {
        let fields = [
            "STATIC_API_KEY",
            "STATIC_API_USER_ID",
            "STATIC_API_ORG_ID",
            "STATIC_API_EMAIL",
            "STATIC_API_NAME",
        ];
        let present: Vec<Option<String>> = fields.iter().map(|f| env_opt(f)).collect();
        let any_present = present.iter().any(Option::is_some);
        let all_present = present.iter().all(Option::is_some);

        if !any_present {
            return Ok(None);
        }
        if !all_present {
            return Err(ConfigError::PartialAuthConfiguration(
                "STATIC_API_* variables must all be set together, or none at all".to_string(),
            ));
        }

        Ok(Some(StaticCredentialConfig {
            key: env_required("STATIC_API_KEY")?,
            user_id: env_required("STATIC_API_USER_ID")?,
            org_id: env_required("STATIC_API_ORG_ID")?,
            email: env_required("STATIC_API_EMAIL")?,
            name: env_required("STATIC_API_NAME")?,
        }))
    }

    fn load_issuers() -> Vec<IssuerConfig> {
        let mut issuers = Vec::new();
        if let Some(jwks_url) = env_opt("ISSUER_A_JWKS_URL") {
            issuers.push(IssuerConfig {
                id: "issuer_a",
                jwks_url,
            });
        }
        if let Some(base_url) = env_opt("ISSUER_B_BASE_URL") {
            issuers.push(IssuerConfig {
                id: "issuer_b",
                jwks_url: format!("{}/.well-known/jwks.json", base_url.trim_end_matches('/')),
            });
        }
        issuers
    }

    fn load_kv() -> Option<KvConfig> {
        let url = env_opt("KV_STORE_URL")?;
        let token = env_opt("KV_STORE_TOKEN").unwrap_or_default();
        Some(KvConfig { url, token })
    }

    fn load_token_encryption_key() -> Result<[u8; 32], ConfigError> {
        use base64::Engine;
        let raw = env_required("TOKEN_ENCRYPTION_KEY")?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&raw)
            .map_err(|_| {
                ConfigError::InvalidValue("TOKEN_ENCRYPTION_KEY".to_string(), "not valid base64".to_string())
            })?;
        let array: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            ConfigError::InvalidValue(
                "TOKEN_ENCRYPTION_KEY".to_string(),
                format!("expected 32 bytes after decoding, got {}", bytes.len()),
            )
        })?;
        Ok(array)
    }

    fn load_agents() -> Result<AgentConfig, ConfigError> {
        let primary_name = env_required("AGENT_PRIMARY_NAME")?;
        let fallback_enabled = env_parsed("AGENT_FALLBACK_ENABLED", false)?;

        let mut endpoints = Vec::new();
        let prefix = "AGENT_ENDPOINT_";
        for (key, value) in std::env::vars() {
            if let Some(name) = key.strip_prefix(prefix) {
                if !value.is_empty() {
                    endpoints.push((name.to_lowercase(), value));
                }
            }
        }
        if endpoints.is_empty() {
            return Err(ConfigError::MissingRequired(
                "AGENT_ENDPOINT_<NAME> (at least one)".to_string(),
            ));
        }

        Ok(AgentConfig {
            primary_name,
            fallback_enabled,
            endpoints,
        })
    }

    /// Scans `MCP_OAUTH_PROVIDER_<NAME>_*` variables, one provider per
    /// distinct `<NAME>`. Absent entirely when no such variables are set —
    /// MCP connections with `auth: none` or `static_bearer` don't need one.
    fn load_mcp_oauth_providers() -> Vec<(String, McpProviderConfig)> {
        let prefix = "MCP_OAUTH_PROVIDER_";
        let mut names: Vec<String> = Vec::new();
        for (key, _) in std::env::vars() {
            if let Some(rest) = key.strip_prefix(prefix) {
                if let Some(name) = rest.strip_suffix("_AUTHORIZE_URL") {
                    names.push(name.to_lowercase());
                }
            }
        }

        let mut providers = Vec::new();
        for name in names {
            let upper = name.to_uppercase();
            let authorize_url = match env_opt(&format!("{prefix}{upper}_AUTHORIZE_URL")) {
                Some(v) => v,
                None => continue,
            };
            let token_url = match env_opt(&format!("{prefix}{upper}_TOKEN_URL")) {
                Some(v) => v,
                None => continue,
            };
            let client_id = env_opt(&format!("{prefix}{upper}_CLIENT_ID")).unwrap_or_default();
            let client_secret =
                env_opt(&format!("{prefix}{upper}_CLIENT_SECRET")).unwrap_or_default();
            let revoke_url = env_opt(&format!("{prefix}{upper}_REVOKE_URL"));
            let scopes = env_opt(&format!("{prefix}{upper}_SCOPES"))
                .map(|raw| raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default();

            providers.push((
                name,
                McpProviderConfig {
                    authorize_url,
                    token_url,
                    revoke_url,
                    client_id,
                    client_secret,
                    scopes,
                },
            ));
        }
        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for (key, _) in std::env::vars() {
            if key.starts_with("STATIC_API_")
                || key.starts_with("ISSUER_")
                || key.starts_with("STORAGE_")
                || key.starts_with("KV_STORE_")
                || key == "TOKEN_ENCRYPTION_KEY"
                || key.starts_with("AGENT_")
                || key.starts_with("RATE_LIMIT_")
                || key.starts_with("BREAKER_")
                || key.ends_with("_DEADLINE_SECS")
                || key == "HTTP_PORT"
            {
                unsafe {
                    std::env::remove_var(key);
                }
            }
        }
    }

    fn set(name: &str, value: &str) {
        unsafe {
            std::env::set_var(name, value);
        }
    }

    fn minimal_valid_env() {
        set("STATIC_API_KEY", "dev-key");
        set("STATIC_API_USER_ID", "u1");
        set("STATIC_API_ORG_ID", "o1");
        set("STATIC_API_EMAIL", "u1@example.com");
        set("STATIC_API_NAME", "Dev User");
        set("STORAGE_REST_ENDPOINT", "https://storage.example.com");
        set("STORAGE_SERVICE_ROLE_CREDENTIAL", "service-role-token");
        set("TOKEN_ENCRYPTION_KEY", &base64_32_zeroes());
        set("AGENT_PRIMARY_NAME", "primary");
        set("AGENT_ENDPOINT_PRIMARY", "http://localhost:9000");
    }

    fn base64_32_zeroes() -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode([0u8; 32])
    }

    #[test]
    fn loads_minimal_valid_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        minimal_valid_env();
        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.http_port, 3284);
        assert!(config.static_credential.is_some());
        assert_eq!(config.agents.primary_name, "primary");
        clear_env();
    }

    #[test]
    fn partial_static_config_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        minimal_valid_env();
        unsafe {
            std::env::remove_var("STATIC_API_EMAIL");
        }
        let err = AppConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::PartialAuthConfiguration(_)));
        clear_env();
    }

    #[test]
    fn no_auth_method_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        minimal_valid_env();
        unsafe {
            std::env::remove_var("STATIC_API_KEY");
            std::env::remove_var("STATIC_API_USER_ID");
            std::env::remove_var("STATIC_API_ORG_ID");
            std::env::remove_var("STATIC_API_EMAIL");
            std::env::remove_var("STATIC_API_NAME");
        }
        let err = AppConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::NoAuthMethodConfigured));
        clear_env();
    }

    #[test]
    fn issuer_b_jwks_url_is_derived_from_base() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        minimal_valid_env();
        set("ISSUER_B_BASE_URL", "https://issuer-b.example.com/");
        let config = AppConfig::from_env().unwrap();
        let issuer_b = config.issuers.iter().find(|i| i.id == "issuer_b").unwrap();
        assert_eq!(
            issuer_b.jwks_url,
            "https://issuer-b.example.com/.well-known/jwks.json"
        );
        clear_env();
    }
}
