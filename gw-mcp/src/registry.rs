//! Persistence and name-uniqueness enforcement for [`MCPConfig`] rows
//! (spec §3: "name unique per owner").

use crate::config::MCPConfig;
use crate::error::McpError;
use async_trait::async_trait;
use gw_core::PrincipalId;

#[async_trait]
pub trait McpConfigStore: Send + Sync {
    async fn find(&self, owner: &PrincipalId, name: &str) -> Result<Option<MCPConfig>, McpError>;
    async fn list(&self, owner: &PrincipalId) -> Result<Vec<MCPConfig>, McpError>;
    async fn insert(&self, config: &MCPConfig) -> Result<(), McpError>;
    async fn update(&self, config: &MCPConfig) -> Result<(), McpError>;
    async fn delete(&self, owner: &PrincipalId, name: &str) -> Result<(), McpError>;
}

/// REST-backed [`McpConfigStore`] against the `mcp_configs` resource,
/// following the same data-plane pattern as `gw_audit::RestAuditWriter`.
pub struct RestMcpConfigStore {
    client: reqwest::Client,
    endpoint: String,
    credential: String,
}

impl RestMcpConfigStore {
    pub fn new(rest_endpoint: impl Into<String>, service_role_credential: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: rest_endpoint.into(),
            credential: service_role_credential.into(),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/mcp_configs", self.endpoint.trim_end_matches('/'))
    }

    fn row_url(&self, owner: &PrincipalId, name: &str) -> String {
        format!("{}?owner=eq.{}&name=eq.{}", self.collection_url(), owner, name)
    }
}

#[async_trait]
impl McpConfigStore for RestMcpConfigStore {
    async fn find(&self, owner: &PrincipalId, name: &str) -> Result<Option<MCPConfig>, McpError> {
        let response = self
            .client
            .get(self.row_url(owner, name))
            .bearer_auth(&self.credential)
            .send()
            .await
            .map_err(|e| McpError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(McpError::Storage(format!(
                "mcp config fetch failed with status {}",
                response.status()
            )));
        }
        let mut rows: Vec<MCPConfig> =
            response.json().await.map_err(|e| McpError::Storage(e.to_string()))?;
        Ok(rows.pop())
    }

    async fn list(&self, owner: &PrincipalId) -> Result<Vec<MCPConfig>, McpError> {
        let url = format!("{}?owner=eq.{}", self.collection_url(), owner);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.credential)
            .send()
            .await
            .map_err(|e| McpError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(McpError::Storage(format!(
                "mcp config list failed with status {}",
                response.status()
            )));
        }
        response.json().await.map_err(|e| McpError::Storage(e.to_string()))
    }

    async fn insert(&self, config: &MCPConfig) -> Result<(), McpError> {
        let response = self
            .client
            .post(self.collection_url())
            .bearer_auth(&self.credential)
            .json(config)
            .send()
            .await
            .map_err(|e| McpError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(McpError::Storage(format!(
                "mcp config insert failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn update(&self, config: &MCPConfig) -> Result<(), McpError> {
        let response = self
            .client
            .patch(self.row_url(&config.owner, &config.name))
            .bearer_auth(&self.credential)
            .json(config)
            .send()
            .await
            .map_err(|e| McpError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(McpError::Storage(format!(
                "mcp config update failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn delete(&self, owner: &PrincipalId, name: &str) -> Result<(), McpError> {
        let response = self
            .client
            .delete(self.row_url(owner, name))
            .bearer_auth(&self.credential)
            .send()
            .await
            .map_err(|e| McpError::Storage(e.to_string()))?;
        if !response.status().is_success() && response.status().as_u16() != 404 {
            return Err(McpError::Storage(format!(
                "mcp config delete failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Validates and persists [`MCPConfig`] rows, enforcing the
/// name-unique-per-owner invariant before an insert reaches storage.
pub struct McpRegistry {
    store: Box<dyn McpConfigStore>,
}

impl McpRegistry {
    pub fn new(store: Box<dyn McpConfigStore>) -> Self {
        Self { store }
    }

    pub async fn register(&self, config: MCPConfig) -> Result<(), McpError> {
        config.validate()?;
        if self.store.find(&config.owner, &config.name).await?.is_some() {
            return Err(McpError::DuplicateName(config.name));
        }
        self.store.insert(&config).await
    }

    pub async fn get(&self, owner: &PrincipalId, name: &str) -> Result<MCPConfig, McpError> {
        self.store
            .find(owner, name)
            .await?
            .ok_or_else(|| McpError::NotFound(name.to_string()))
    }

    pub async fn list(&self, owner: &PrincipalId) -> Result<Vec<MCPConfig>, McpError> {
        self.store.list(owner).await
    }

    pub async fn deactivate(&self, owner: &PrincipalId, name: &str) -> Result<(), McpError> {
        let mut config = self.get(owner, name).await?;
        config.active = false;
        self.store.update(&config).await
    }

    pub async fn remove(&self, owner: &PrincipalId, name: &str) -> Result<(), McpError> {
        self.store.delete(owner, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthDescriptor, Transport};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    struct InMemoryStore(Mutex<Vec<MCPConfig>>);

    impl InMemoryStore {
        fn new() -> Self {
            Self(Mutex::new(Vec::new()))
        }
    }

    #[async_trait]
    impl McpConfigStore for InMemoryStore {
        async fn find(&self, owner: &PrincipalId, name: &str) -> Result<Option<MCPConfig>, McpError> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .iter()
                .find(|c| &c.owner == owner && c.name == name)
                .cloned())
        }

        async fn list(&self, owner: &PrincipalId) -> Result<Vec<MCPConfig>, McpError> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .iter()
                .filter(|c| &c.owner == owner)
                .cloned()
                .collect())
        }

        async fn insert(&self, config: &MCPConfig) -> Result<(), McpError> {
            self.0.lock().unwrap().push(config.clone());
            Ok(())
        }

        async fn update(&self, config: &MCPConfig) -> Result<(), McpError> {
            let mut guard = self.0.lock().unwrap();
            if let Some(existing) = guard
                .iter_mut()
                .find(|c| c.owner == config.owner && c.name == config.name)
            {
                *existing = config.clone();
            }
            Ok(())
        }

        async fn delete(&self, owner: &PrincipalId, name: &str) -> Result<(), McpError> {
            self.0
                .lock()
                .unwrap()
                .retain(|c| !(&c.owner == owner && c.name == name));
            Ok(())
        }
    }

    fn sample_config(owner: &str, name: &str) -> MCPConfig {
        MCPConfig {
            owner: PrincipalId::from(owner.to_string()),
            org_id: gw_core::OrgId::from("org-1".to_string()),
            name: name.to_string(),
            transport: Transport::Http {
                endpoint: "https://mcp.example.com".to_string(),
                headers: StdHashMap::new(),
            },
            auth: AuthDescriptor::None,
            active: true,
        }
    }

    #[tokio::test]
    async fn registers_unique_name_per_owner() {
        let registry = McpRegistry::new(Box::new(InMemoryStore::new()));
        registry.register(sample_config("u-1", "tools")).await.unwrap();
        let err = registry
            .register(sample_config("u-1", "tools"))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn same_name_allowed_for_different_owners() {
        let registry = McpRegistry::new(Box::new(InMemoryStore::new()));
        registry.register(sample_config("u-1", "tools")).await.unwrap();
        registry.register(sample_config("u-2", "tools")).await.unwrap();
    }

    #[tokio::test]
    async fn deactivate_flips_active_flag() {
        let registry = McpRegistry::new(Box::new(InMemoryStore::new()));
        registry.register(sample_config("u-1", "tools")).await.unwrap();
        registry.deactivate(&PrincipalId::from("u-1".to_string()), "tools").await.unwrap();
        let config = registry.get(&PrincipalId::from("u-1".to_string()), "tools").await.unwrap();
        assert!(!config.active);
    }
}
