use gw_core::GatewayError;
use thiserror::Error;

/// Internal session-store error. Converted to [`GatewayError`] at the
/// crate boundary so callers only ever see the shared taxonomy.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session {0} is not owned by the requesting principal")]
    Forbidden(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl SessionError {
    pub fn category(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "not_found",
            SessionError::Forbidden(_) => "forbidden",
            SessionError::Storage(_) => "storage",
        }
    }
}

impl From<SessionError> for GatewayError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(id) => GatewayError::NotFound(id),
            SessionError::Forbidden(_) => GatewayError::Forbidden,
            SessionError::Storage(detail) => GatewayError::Storage(detail),
        }
    }
}
