use thiserror::Error;

/// Configuration errors are always fatal at startup (spec §7: "the process
/// must not attempt to run with partial auth configuration"). The binary
/// maps any of these to exit code 1.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("partial authentication configuration: {0}")]
    PartialAuthConfiguration(String),

    #[error("no authentication method configured: set STATIC_API_KEY or at least one issuer")]
    NoAuthMethodConfigured,
}
