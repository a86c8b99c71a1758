use crate::ids::{OrgId, PrincipalId};
use serde::{Deserialize, Serialize};

/// Authorization role carried by a [`Principal`].
///
/// Ordering matters for `>=` comparisons used by the tiered access
/// middleware: `User < Admin < PlatformAdmin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    PlatformAdmin,
}

impl Role {
    /// True for any role the admin-tier middleware should let through.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::PlatformAdmin)
    }
}

/// Which step of the credential chain (spec §4.2) produced this principal.
///
/// Recorded on every audit event so `authentication_method=static` is
/// directly observable, per the testable property in spec §8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Static,
    DbKey,
    IssuerA,
    IssuerB,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Static => "static",
            AuthMethod::DbKey => "db_key",
            AuthMethod::IssuerA => "issuer_a",
            AuthMethod::IssuerB => "issuer_b",
        }
    }
}

/// The authenticated subject of a request (spec §3).
///
/// Transient: constructed fresh on every successful credential
/// validation, never persisted as its own row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub org_id: OrgId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub auth_method: AuthMethod,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Admin principals bypass per-principal rate limiting (spec §4.4, §9
    /// open question — the static-credential principal is minted with
    /// `Role::PlatformAdmin`, so this coupling is intentional and retained).
    pub fn bypasses_rate_limit(&self) -> bool {
        self.is_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal {
            id: PrincipalId::from("u1".to_string()),
            org_id: OrgId::from("o1".to_string()),
            email: "u1@example.com".to_string(),
            display_name: "U1".to_string(),
            role,
            auth_method: AuthMethod::Static,
        }
    }

    #[test]
    fn platform_admin_is_admin() {
        assert!(principal(Role::PlatformAdmin).is_admin());
        assert!(principal(Role::Admin).is_admin());
        assert!(!principal(Role::User).is_admin());
    }

    #[test]
    fn only_admins_bypass_rate_limit() {
        assert!(principal(Role::PlatformAdmin).bypasses_rate_limit());
        assert!(!principal(Role::User).bypasses_rate_limit());
    }

    #[test]
    fn role_ordering() {
        assert!(Role::User < Role::Admin);
        assert!(Role::Admin < Role::PlatformAdmin);
    }
}
