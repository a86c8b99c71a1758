use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeysError {
    #[error("upstream identity provider unavailable for issuer {issuer}")]
    UpstreamUnavailable { issuer: String },

    #[error("unknown signing key {key_id} for issuer {issuer}")]
    UnknownKey { issuer: String, key_id: String },

    #[error("unsupported key algorithm for issuer {issuer}: {detail}")]
    UnsupportedAlgorithm { issuer: String, detail: String },

    #[error("malformed JWKS document from {issuer}: {detail}")]
    MalformedDocument { issuer: String, detail: String },
}

impl KeysError {
    pub fn category(&self) -> &'static str {
        match self {
            KeysError::UpstreamUnavailable { .. } => "upstream_unavailable",
            KeysError::UnknownKey { .. } => "unknown_key",
            KeysError::UnsupportedAlgorithm { .. } => "unsupported_algorithm",
            KeysError::MalformedDocument { .. } => "malformed_document",
        }
    }
}
