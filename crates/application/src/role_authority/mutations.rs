use roleguard_core::{AppError, AppResult, Principal, PrincipalId};
use roleguard_domain::{ProtectedResource, ResourceId, RoleBoundResource, RoleId, RoleLevel, RoleRecord};
use tracing::{info, warn};

use super::RoleAuthority;

impl RoleAuthority {
    /// Creates and persists the role record for a new resource.
    ///
    /// The creator is granted `Owner` unconditionally.
    pub async fn create_role_record(
        &self,
        creator_id: &PrincipalId,
        default_level: RoleLevel,
        duplicate_threshold: Option<RoleLevel>,
    ) -> AppResult<RoleRecord> {
        let mut role = RoleRecord::new(creator_id.clone(), default_level);
        if let Some(duplicate_threshold) = duplicate_threshold {
            role = role.with_duplicate_threshold(duplicate_threshold);
        }

        self.role_repository.create_role(role.clone()).await?;
        info!(
            role_id = %role.id(),
            creator_id = %creator_id,
            default_level = default_level.as_str(),
            "role record created"
        );

        Ok(role)
    }

    /// Sets the explicit level of `target_id` on a resource.
    ///
    /// Only explicit owners may manage grants; everyone else is forbidden.
    pub async fn set_user_level(
        &self,
        requesting: &Principal,
        target_id: &PrincipalId,
        resource_id: ResourceId,
        level: RoleLevel,
    ) -> AppResult<RoleRecord> {
        let resource = self.load_for_role_management(requesting, resource_id).await?;
        let role = self
            .role_repository
            .set_user_level(resource.role().id(), target_id, level)
            .await?;

        info!(
            resource_id = %resource_id,
            target_id = %target_id,
            level = level.as_str(),
            "user level set"
        );

        Ok(role)
    }

    /// Removes the explicit level of `target_id` so it falls back to the default.
    pub async fn remove_user_level(
        &self,
        requesting: &Principal,
        target_id: &PrincipalId,
        resource_id: ResourceId,
    ) -> AppResult<RoleRecord> {
        let resource = self.load_for_role_management(requesting, resource_id).await?;
        let role = self
            .role_repository
            .remove_user_level(resource.role().id(), target_id)
            .await?;

        info!(
            resource_id = %resource_id,
            target_id = %target_id,
            "user level removed"
        );

        Ok(role)
    }

    /// Deletes a role record once its owning resource is hard deleted.
    pub async fn delete_role(&self, role_id: RoleId) -> AppResult<()> {
        self.role_repository.delete_role(role_id).await
    }

    async fn load_for_role_management(
        &self,
        requesting: &Principal,
        resource_id: ResourceId,
    ) -> AppResult<RoleBoundResource> {
        let resource = self
            .resource_store
            .find_resource(resource_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("resource '{resource_id}'")))?;

        if !self.is_owner(requesting, &resource) {
            warn!(
                resource_id = %resource_id,
                requesting = ?requesting.id().map(PrincipalId::as_str),
                "role management denied for non-owner"
            );
            return Err(AppError::Forbidden(format!(
                "only owners may manage roles of resource '{resource_id}'"
            )));
        }

        Ok(resource)
    }
}
