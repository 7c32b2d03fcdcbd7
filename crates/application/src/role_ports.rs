use async_trait::async_trait;
use roleguard_core::{AppResult, PrincipalId};
use roleguard_domain::{RoleId, RoleLevel, RoleRecord};

/// Repository port for role record persistence.
///
/// Grant mutations are single-key atomic updates; implementations must not
/// read the whole map, modify it and write it back.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Persists a freshly created role record.
    async fn create_role(&self, role: RoleRecord) -> AppResult<()>;

    /// Finds a role record by id.
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<RoleRecord>>;

    /// Sets one explicit principal grant and returns the updated record.
    async fn set_user_level(
        &self,
        role_id: RoleId,
        principal_id: &PrincipalId,
        level: RoleLevel,
    ) -> AppResult<RoleRecord>;

    /// Removes one explicit principal grant and returns the updated record.
    async fn remove_user_level(
        &self,
        role_id: RoleId,
        principal_id: &PrincipalId,
    ) -> AppResult<RoleRecord>;

    /// Deletes a role record once its resource is gone.
    async fn delete_role(&self, role_id: RoleId) -> AppResult<()>;
}

/// Resolves the groups a principal belongs to.
#[async_trait]
pub trait GroupResolver: Send + Sync {
    /// Lists group ids for the principal.
    async fn groups_for(&self, principal_id: &PrincipalId) -> AppResult<Vec<String>>;
}

/// Group resolver for deployments without group membership.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGroupResolver;

#[async_trait]
impl GroupResolver for NoGroupResolver {
    async fn groups_for(&self, _principal_id: &PrincipalId) -> AppResult<Vec<String>> {
        Ok(Vec::new())
    }
}
