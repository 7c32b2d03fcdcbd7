//! In-memory role repository for local runs and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use roleguard_application::RoleRepository;
use roleguard_core::{AppError, AppResult, PrincipalId};
use roleguard_domain::{RoleId, RoleLevel, RoleRecord};
use tokio::sync::RwLock;

/// Role repository keeping role records in process memory.
///
/// Each grant mutation holds the write lock for a single key update.
#[derive(Debug, Default)]
pub struct InMemoryRoleRepository {
    roles: RwLock<HashMap<RoleId, RoleRecord>>,
}

impl InMemoryRoleRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored role records.
    pub async fn len(&self) -> usize {
        self.roles.read().await.len()
    }

    /// Returns true when no role records are stored.
    pub async fn is_empty(&self) -> bool {
        self.roles.read().await.is_empty()
    }
}

#[async_trait]
impl RoleRepository for InMemoryRoleRepository {
    async fn create_role(&self, role: RoleRecord) -> AppResult<()> {
        let mut roles = self.roles.write().await;
        if roles.contains_key(&role.id()) {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.id()
            )));
        }

        roles.insert(role.id(), role);
        Ok(())
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<RoleRecord>> {
        Ok(self.roles.read().await.get(&role_id).cloned())
    }

    async fn set_user_level(
        &self,
        role_id: RoleId,
        principal_id: &PrincipalId,
        level: RoleLevel,
    ) -> AppResult<RoleRecord> {
        let mut roles = self.roles.write().await;
        let role = roles
            .get_mut(&role_id)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))?;

        role.set_user_level(principal_id.clone(), level);
        Ok(role.clone())
    }

    async fn remove_user_level(
        &self,
        role_id: RoleId,
        principal_id: &PrincipalId,
    ) -> AppResult<RoleRecord> {
        let mut roles = self.roles.write().await;
        let role = roles
            .get_mut(&role_id)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))?;

        role.remove_user_level(principal_id.as_str());
        Ok(role.clone())
    }

    async fn delete_role(&self, role_id: RoleId) -> AppResult<()> {
        self.roles.write().await.remove(&role_id);
        Ok(())
    }
}
