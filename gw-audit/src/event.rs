//! The immutable audit record (spec §3 AuditEvent).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One append-only entry. Never updated or deleted once written; retention
/// is governed externally (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub org_id: String,
    pub action: String,
    pub resource_kind: String,
    pub resource_id: String,
    pub outcome: String,
    pub details: Value,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Builder for the common case: caller supplies the few fields that vary
/// per call site and leaves bookkeeping (id, timestamp) to `build()`.
pub struct AuditEventBuilder {
    actor_id: String,
    org_id: String,
    action: String,
    resource_kind: String,
    resource_id: String,
    outcome: String,
    details: Value,
    source_ip: Option<String>,
    user_agent: Option<String>,
}

impl AuditEventBuilder {
    pub fn new(
        actor_id: impl Into<String>,
        action: impl Into<String>,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            org_id: String::new(),
            action: action.into(),
            resource_kind: String::new(),
            resource_id: String::new(),
            outcome: outcome.into(),
            details: Value::Null,
            source_ip: None,
            user_agent: None,
        }
    }

    pub fn org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = org_id.into();
        self
    }

    pub fn resource(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.resource_kind = kind.into();
        self.resource_id = id.into();
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn source_ip(mut self, ip: impl Into<String>) -> Self {
        self.source_ip = Some(ip.into());
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    pub fn build(self) -> AuditEvent {
        AuditEvent {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            actor_id: self.actor_id,
            org_id: self.org_id,
            action: self.action,
            resource_kind: self.resource_kind,
            resource_id: self.resource_id,
            outcome: self.outcome,
            details: self.details,
            source_ip: self.source_ip,
            user_agent: self.user_agent,
        }
    }
}
