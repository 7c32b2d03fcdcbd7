use std::sync::Arc;

use chrono::Utc;
use roleguard_core::{AppError, AppResult, Principal, PrincipalId};
use roleguard_domain::{
    ProtectedResource, ResourceDocument, ResourceId, ResourceKind, RoleBoundResource, RoleLevel,
    RoleRecord,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    Page, PageRequest, ResourcePipeline, ResourceSort, ResourceStore, RoleAuthority, StageFilter,
    paginate,
};


/// Listing parameters for protected resources.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceListQuery {
    /// Collection to list.
    pub kind: ResourceKind,
    /// Minimum effective level the caller needs on each listed resource.
    pub threshold: RoleLevel,
    /// Restricts the listing to resources this principal owns.
    pub owned_by: Option<PrincipalId>,
    /// Domain filters applied alongside authorization.
    pub filters: Vec<StageFilter>,
    /// Includes soft deleted resources.
    pub include_deleted: bool,
    /// Sort instructions.
    pub sort: Vec<ResourceSort>,
    /// Requested page.
    pub page: PageRequest,
}

impl ResourceListQuery {
    /// Creates a listing of `kind` for callers reaching `threshold`.
    #[must_use]
    pub fn new(kind: ResourceKind, threshold: RoleLevel) -> Self {
        Self {
            kind,
            threshold,
            owned_by: None,
            filters: Vec::new(),
            include_deleted: false,
            sort: Vec::new(),
            page: PageRequest::default(),
        }
    }
}

/// Resource lifecycle service binding every resource to its role record.
#[derive(Clone)]
pub struct ResourceService {
    authority: RoleAuthority,
    resource_store: Arc<dyn ResourceStore>,
}

impl ResourceService {
    /// Creates a resource service.
    #[must_use]
    pub fn new(authority: RoleAuthority, resource_store: Arc<dyn ResourceStore>) -> Self {
        Self {
            authority,
            resource_store,
        }
    }

    /// Returns the authority used for decisions.
    #[must_use]
    pub fn authority(&self) -> &RoleAuthority {
        &self.authority
    }

    /// Creates a resource together with its role record.
    pub async fn create_resource(
        &self,
        principal: &Principal,
        kind: ResourceKind,
        data: Value,
        default_level: RoleLevel,
    ) -> AppResult<RoleBoundResource> {
        let creator_id = authenticated_id(principal)?;
        let role = self
            .authority
            .create_role_record(creator_id, default_level, None)
            .await?;

        self.insert_bound(kind, data, role).await
    }

    /// Loads a resource the principal may act on at `threshold`.
    pub async fn get_resource(
        &self,
        principal: &Principal,
        resource_id: ResourceId,
        threshold: RoleLevel,
    ) -> AppResult<RoleBoundResource> {
        let resource = self
            .authority
            .require_access(principal, resource_id, threshold)
            .await?;
        if resource.document().is_deleted() {
            return Err(AppError::NotFound(format!("resource '{resource_id}'")));
        }

        Ok(resource)
    }

    /// Lists one page of resources the principal may act on.
    pub async fn list_resources(
        &self,
        principal: &Principal,
        query: ResourceListQuery,
    ) -> AppResult<Page<RoleBoundResource>> {
        let mut pipeline = ResourcePipeline::for_kind(query.kind);
        if !query.include_deleted {
            pipeline = pipeline.filter(StageFilter::ExcludeDeleted);
        }
        for filter in query.filters {
            pipeline = pipeline.filter(filter);
        }

        pipeline = pipeline.with_stages(
            self.authority
                .build_authorization_stages(principal, query.threshold)
                .await?,
        );
        if let Some(owner_id) = &query.owned_by {
            pipeline = pipeline.with_stages(self.authority.build_owner_filter_stages(owner_id));
        }

        paginate(
            self.resource_store.as_ref(),
            pipeline.sort(query.sort),
            query.page,
        )
        .await
    }

    /// Copies a resource into a new one owned by the principal.
    ///
    /// The copy keeps the source's default level and duplicate threshold.
    pub async fn duplicate_resource(
        &self,
        principal: &Principal,
        resource_id: ResourceId,
    ) -> AppResult<RoleBoundResource> {
        let creator_id = authenticated_id(principal)?;
        let source = self
            .get_resource(principal, resource_id, RoleLevel::Observer)
            .await?;

        if !self.authority.can_duplicate(principal, &source).await? {
            warn!(
                resource_id = %resource_id,
                principal_id = %creator_id,
                "duplicate denied below duplicate threshold"
            );
            return Err(AppError::Forbidden(format!(
                "principal '{creator_id}' may not duplicate resource '{resource_id}'"
            )));
        }

        let role = self
            .authority
            .create_role_record(
                creator_id,
                source.role().default_level(),
                Some(source.role().duplicate_threshold()),
            )
            .await?;

        let (document, _) = source.into_parts();
        let duplicate = self
            .insert_bound(document.kind(), document.data().clone(), role)
            .await?;
        info!(
            source_id = %resource_id,
            resource_id = %duplicate.resource_id(),
            "resource duplicated"
        );

        Ok(duplicate)
    }

    /// Soft deletes a resource. Its role record is kept.
    pub async fn soft_delete_resource(
        &self,
        principal: &Principal,
        resource_id: ResourceId,
    ) -> AppResult<()> {
        self.get_resource(principal, resource_id, RoleLevel::Manager)
            .await?;
        self.resource_store
            .mark_deleted(resource_id, Utc::now())
            .await?;

        info!(resource_id = %resource_id, "resource soft deleted");
        Ok(())
    }

    /// Hard deletes a resource and its role record. Owners only.
    pub async fn hard_delete_resource(
        &self,
        principal: &Principal,
        resource_id: ResourceId,
    ) -> AppResult<()> {
        let resource = self
            .authority
            .require_access(principal, resource_id, RoleLevel::Observer)
            .await?;
        if !self.authority.is_owner(principal, &resource) {
            return Err(AppError::Forbidden(format!(
                "only owners may delete resource '{resource_id}'"
            )));
        }

        // The resource row goes first because it references the role.
        self.resource_store.delete_resource(resource_id).await?;
        if let Err(error) = self.authority.delete_role(resource.role().id()).await {
            warn!(
                resource_id = %resource_id,
                role_id = %resource.role().id(),
                error = %error,
                "role record orphaned after resource hard delete"
            );
            return Err(error);
        }

        info!(resource_id = %resource_id, "resource hard deleted");
        Ok(())
    }

    async fn insert_bound(
        &self,
        kind: ResourceKind,
        data: Value,
        role: RoleRecord,
    ) -> AppResult<RoleBoundResource> {
        let document = match ResourceDocument::new(kind, role.id(), data) {
            Ok(document) => document,
            Err(error) => {
                self.discard_role(&role).await;
                return Err(error);
            }
        };

        if let Err(error) = self.resource_store.insert_resource(document.clone()).await {
            self.discard_role(&role).await;
            return Err(error);
        }

        RoleBoundResource::bind(document, role)
    }

    async fn discard_role(&self, role: &RoleRecord) {
        if let Err(error) = self.authority.delete_role(role.id()).await {
            warn!(
                role_id = %role.id(),
                error = %error,
                "failed to discard role record of unsaved resource"
            );
        }
    }
}

fn authenticated_id(principal: &Principal) -> AppResult<&PrincipalId> {
    principal
        .id()
        .ok_or_else(|| AppError::Unauthorized("an authenticated principal is required".to_owned()))
}
