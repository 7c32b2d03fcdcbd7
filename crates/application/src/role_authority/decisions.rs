use roleguard_core::{AppError, AppResult, Principal};
use roleguard_domain::{
    AccessPredicate, LevelExpression, ProtectedResource, ResourceId, RoleBoundResource, RoleLevel,
};
use tracing::debug;

use super::RoleAuthority;

impl RoleAuthority {
    /// Resolves the principal's effective level on a loaded resource.
    pub async fn effective_level<R>(&self, principal: &Principal, resource: &R) -> AppResult<RoleLevel>
    where
        R: ProtectedResource + Sync,
    {
        let group_ids = self.resolve_groups(principal).await?;
        Ok(LevelExpression::effective_level(principal, &group_ids).evaluate(resource.role()))
    }

    /// Returns whether the principal holds an explicit `Owner` grant.
    ///
    /// Independent of the default level and groups: a resource whose default
    /// level is `Owner` lets everyone pass `Owner` capability checks without
    /// making them owners.
    #[must_use]
    pub fn is_owner<R>(&self, principal: &Principal, resource: &R) -> bool
    where
        R: ProtectedResource + ?Sized,
    {
        principal
            .id()
            .map(|principal_id| AccessPredicate::owner(principal_id).evaluate(resource.role()))
            .unwrap_or(false)
    }

    /// Checks that the effective level on a loaded resource reaches `threshold`.
    pub async fn authorize_resource<R>(
        &self,
        principal: &Principal,
        resource: &R,
        threshold: RoleLevel,
    ) -> AppResult<bool>
    where
        R: ProtectedResource + Sync,
    {
        let group_ids = self.resolve_groups(principal).await?;
        let granted = AccessPredicate::at_least(principal, &group_ids, threshold)
            .evaluate(resource.role());

        debug!(
            resource_id = %resource.resource_id(),
            threshold = threshold.as_str(),
            granted,
            "resource authorization evaluated"
        );

        Ok(granted)
    }

    /// Loads a resource and checks its effective level against `threshold`.
    ///
    /// Missing resources are reported as `false`, like any other denial.
    pub async fn authorize(
        &self,
        principal: &Principal,
        resource_id: ResourceId,
        threshold: RoleLevel,
    ) -> AppResult<bool> {
        match self.resource_store.find_resource(resource_id).await? {
            Some(resource) => self.authorize_resource(principal, &resource, threshold).await,
            None => Ok(false),
        }
    }

    /// Loads a resource the principal may act on at `threshold`.
    ///
    /// Denials surface as not found so callers never learn whether a hidden
    /// resource exists.
    pub async fn require_access(
        &self,
        principal: &Principal,
        resource_id: ResourceId,
        threshold: RoleLevel,
    ) -> AppResult<RoleBoundResource> {
        let not_found = || AppError::NotFound(format!("resource '{resource_id}'"));
        let resource = self
            .resource_store
            .find_resource(resource_id)
            .await?
            .ok_or_else(not_found)?;

        if self
            .authorize_resource(principal, &resource, threshold)
            .await?
        {
            Ok(resource)
        } else {
            Err(not_found())
        }
    }

    /// Returns whether the principal may duplicate the resource.
    ///
    /// Explicit owners always may; everyone else needs the role's duplicate
    /// threshold.
    pub async fn can_duplicate<R>(&self, principal: &Principal, resource: &R) -> AppResult<bool>
    where
        R: ProtectedResource + Sync,
    {
        if self.is_owner(principal, resource) {
            return Ok(true);
        }

        let threshold = resource.role().duplicate_threshold();
        self.authorize_resource(principal, resource, threshold).await
    }
}
