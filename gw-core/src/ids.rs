use derive_more::{AsRef, Deref, Display, From, Into};
use serde::{Deserialize, Serialize};

/// Stable identifier for an authenticated caller.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, From, AsRef, Deref, Into, Serialize, Deserialize, Default,
)]
pub struct PrincipalId(String);

/// Organization (tenant) identifier.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, From, AsRef, Deref, Into, Serialize, Deserialize, Default,
)]
pub struct OrgId(String);

/// Identifier of a persisted chat session.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, From, AsRef, Deref, Into, Serialize, Deserialize, Default,
)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Per-request trace identifier, attached to every log line and audit event.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, From, AsRef, Deref, Into, Serialize, Deserialize,
)]
pub struct TraceId(String);

impl TraceId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::generate()
    }
}

/// Name of a configured backend agent (e.g. `"primary"`, `"fallback"`).
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, From, AsRef, Deref, Into, Serialize, Deserialize, Default,
)]
pub struct AgentName(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_generate_is_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn principal_id_roundtrips_through_serde() {
        let id = PrincipalId::from("u-123".to_string());
        let json = serde_json::to_string(&id).unwrap();
        let back: PrincipalId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
