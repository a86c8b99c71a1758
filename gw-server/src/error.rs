//! Single `IntoResponse` boundary: every crate's [`GatewayError`] lands
//! here exactly once, so no handler hand-rolls a status code or response
//! body (spec §7). Wrapping is required by the orphan rule — neither
//! `GatewayError` nor `IntoResponse` is local to this crate.

use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use gw_core::GatewayError;
use serde_json::json;

pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "error": err.public_message(),
            "code": err.category(),
        });
        let mut response = (status, Json(body)).into_response();

        let retry_after = match &err {
            GatewayError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            GatewayError::CircuitOpen { retry_after_secs, .. } => Some(*retry_after_secs),
            GatewayError::TooManyRequests { .. } => Some(5),
            _ => None,
        };
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        if !matches!(status, StatusCode::INTERNAL_SERVER_ERROR) {
            tracing::warn!(code = err.category(), status = status.as_u16(), "request failed");
        } else {
            tracing::error!(code = err.category(), status = status.as_u16(), error = %err, "request failed");
        }

        response
    }
}
