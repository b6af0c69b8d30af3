//! Role and client storage

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::{Client, ClientId, Role, RoleId};

/// Role store trait
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// List all roles
    async fn list(&self) -> Result<Vec<Role>>;

    /// Get a role by exact identifier
    async fn get(&self, role_id: &str) -> Result<Option<Role>>;
}

/// Client store trait
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// List all clients
    async fn list(&self) -> Result<Vec<Client>>;

    /// Get a client by identifier
    async fn get(&self, client_id: &str) -> Result<Option<Client>>;
}

/// In-memory role store implementation
#[derive(Default)]
pub struct InMemoryRoleStore {
    roles: Arc<RwLock<HashMap<RoleId, Role>>>,
}

impl InMemoryRoleStore {
    /// Create a new in-memory role store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `roles`; later duplicates replace earlier ones
    pub fn with_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        let roles = roles
            .into_iter()
            .map(|role| (role.role_id.clone(), role))
            .collect();
        Self {
            roles: Arc::new(RwLock::new(roles)),
        }
    }

    /// Store a role
    pub async fn put(&self, role: Role) {
        let mut roles = self.roles.write().await;
        roles.insert(role.role_id.clone(), role);
    }

    /// Delete a role, returning whether it existed
    pub async fn delete(&self, role_id: &str) -> bool {
        let mut roles = self.roles.write().await;
        roles.remove(role_id).is_some()
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn list(&self) -> Result<Vec<Role>> {
        let roles = self.roles.read().await;
        Ok(roles.values().cloned().collect())
    }

    async fn get(&self, role_id: &str) -> Result<Option<Role>> {
        let roles = self.roles.read().await;
        Ok(roles.get(role_id).cloned())
    }
}

/// In-memory client store implementation
#[derive(Default)]
pub struct InMemoryClientStore {
    clients: Arc<RwLock<HashMap<ClientId, Client>>>,
}

impl InMemoryClientStore {
    /// Create a new in-memory client store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `clients`
    pub fn with_clients(clients: impl IntoIterator<Item = Client>) -> Self {
        let clients = clients
            .into_iter()
            .map(|client| (client.client_id.clone(), client))
            .collect();
        Self {
            clients: Arc::new(RwLock::new(clients)),
        }
    }

    /// Store a client
    pub async fn put(&self, client: Client) {
        let mut clients = self.clients.write().await;
        clients.insert(client.client_id.clone(), client);
    }

    /// Delete a client, returning whether it existed
    pub async fn delete(&self, client_id: &str) -> bool {
        let mut clients = self.clients.write().await;
        clients.remove(client_id).is_some()
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn list(&self) -> Result<Vec<Client>> {
        let clients = self.clients.read().await;
        Ok(clients.values().cloned().collect())
    }

    async fn get(&self, client_id: &str) -> Result<Option<Client>> {
        let clients = self.clients.read().await;
        Ok(clients.get(client_id).cloned())
    }
}
