//! Storage backends for drained audit batches.

use crate::event::AuditEvent;
use async_trait::async_trait;
use gw_core::GatewayError;

#[async_trait]
pub trait AuditWriter: Send + Sync {
    async fn write_batch(&self, events: &[AuditEvent]) -> Result<(), GatewayError>;
}

/// Writes batches to the configured `STORAGE_REST_ENDPOINT` (spec §1: "a
/// relational store (via a REST data-plane)").
pub struct RestAuditWriter {
    client: reqwest::Client,
    endpoint: String,
    credential: String,
}

impl RestAuditWriter {
    pub fn new(rest_endpoint: impl Into<String>, service_role_credential: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: rest_endpoint.into(),
            credential: service_role_credential.into(),
        }
    }

    fn audit_url(&self) -> String {
        format!("{}/audit_events", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl AuditWriter for RestAuditWriter {
    async fn write_batch(&self, events: &[AuditEvent]) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.audit_url())
            .bearer_auth(&self.credential)
            .json(events)
            .send()
            .await
            .map_err(|e| GatewayError::Storage(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Storage(format!(
                "audit batch write failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}
