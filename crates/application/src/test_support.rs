use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roleguard_core::{AppError, AppResult, PrincipalId};
use roleguard_domain::{
    ResourceDocument, ResourceId, RoleBoundResource, RoleId, RoleLevel, RoleRecord,
};
use tokio::sync::Mutex;

use crate::{GroupResolver, ResourcePipeline, ResourceStore, RoleRepository, evaluate_pipeline};

/// Role and resource store backed by plain maps.
#[derive(Default)]
pub(crate) struct FakeStore {
    roles: Mutex<HashMap<RoleId, RoleRecord>>,
    documents: Mutex<HashMap<ResourceId, ResourceDocument>>,
    reject_role_deletes: AtomicBool,
}

impl FakeStore {
    pub(crate) async fn role_count(&self) -> usize {
        self.roles.lock().await.len()
    }

    pub(crate) async fn resource_count(&self) -> usize {
        self.documents.lock().await.len()
    }

    /// Makes every later `delete_role` call fail.
    pub(crate) fn reject_role_deletes(&self) {
        self.reject_role_deletes.store(true, Ordering::SeqCst);
    }

    pub(crate) async fn put_bound(&self, resource: RoleBoundResource) {
        let (document, role) = resource.into_parts();
        self.roles.lock().await.insert(role.id(), role);
        self.documents.lock().await.insert(document.id(), document);
    }

    async fn bind(&self, document: ResourceDocument) -> AppResult<RoleBoundResource> {
        let role = self
            .roles
            .lock()
            .await
            .get(&document.role_id())
            .cloned()
            .ok_or_else(|| {
                AppError::InvariantViolation(format!(
                    "resource '{}' references missing role '{}'",
                    document.id(),
                    document.role_id()
                ))
            })?;

        RoleBoundResource::bind(document, role)
    }
}

#[async_trait]
impl RoleRepository for FakeStore {
    async fn create_role(&self, role: RoleRecord) -> AppResult<()> {
        self.roles.lock().await.insert(role.id(), role);
        Ok(())
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<RoleRecord>> {
        Ok(self.roles.lock().await.get(&role_id).cloned())
    }

    async fn set_user_level(
        &self,
        role_id: RoleId,
        principal_id: &PrincipalId,
        level: RoleLevel,
    ) -> AppResult<RoleRecord> {
        let mut roles = self.roles.lock().await;
        let role = roles
            .get_mut(&role_id)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}'")))?;
        role.set_user_level(principal_id.clone(), level);
        Ok(role.clone())
    }

    async fn remove_user_level(
        &self,
        role_id: RoleId,
        principal_id: &PrincipalId,
    ) -> AppResult<RoleRecord> {
        let mut roles = self.roles.lock().await;
        let role = roles
            .get_mut(&role_id)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}'")))?;
        role.remove_user_level(principal_id.as_str());
        Ok(role.clone())
    }

    async fn delete_role(&self, role_id: RoleId) -> AppResult<()> {
        if self.reject_role_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Internal(format!("role '{role_id}' could not be deleted")));
        }
        self.roles.lock().await.remove(&role_id);
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for FakeStore {
    async fn insert_resource(&self, document: ResourceDocument) -> AppResult<()> {
        self.documents.lock().await.insert(document.id(), document);
        Ok(())
    }

    async fn find_resource(&self, resource_id: ResourceId) -> AppResult<Option<RoleBoundResource>> {
        let document = self.documents.lock().await.get(&resource_id).cloned();
        match document {
            Some(document) => self.bind(document).await.map(Some),
            None => Ok(None),
        }
    }

    async fn mark_deleted(
        &self,
        resource_id: ResourceId,
        deleted_at: DateTime<Utc>,
    ) -> AppResult<()> {
        if let Some(document) = self.documents.lock().await.get_mut(&resource_id) {
            document.mark_deleted(deleted_at);
        }
        Ok(())
    }

    async fn delete_resource(&self, resource_id: ResourceId) -> AppResult<()> {
        self.documents.lock().await.remove(&resource_id);
        Ok(())
    }

    async fn run_pipeline(
        &self,
        pipeline: &ResourcePipeline,
    ) -> AppResult<Vec<RoleBoundResource>> {
        let documents: Vec<ResourceDocument> =
            self.documents.lock().await.values().cloned().collect();
        let mut bound = Vec::with_capacity(documents.len());
        for document in documents {
            bound.push(self.bind(document).await?);
        }

        evaluate_pipeline(pipeline, bound)
    }

    async fn count_pipeline(&self, pipeline: &ResourcePipeline) -> AppResult<u64> {
        let listed = self.run_pipeline(&pipeline.counting()).await?;
        Ok(listed.len() as u64)
    }
}

/// Group resolver backed by a fixed membership map.
#[derive(Default)]
pub(crate) struct FakeGroupResolver {
    pub(crate) memberships: HashMap<String, Vec<String>>,
}

#[async_trait]
impl GroupResolver for FakeGroupResolver {
    async fn groups_for(&self, principal_id: &PrincipalId) -> AppResult<Vec<String>> {
        Ok(self
            .memberships
            .get(principal_id.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

pub(crate) fn principal_id(value: &str) -> PrincipalId {
    PrincipalId::new(value).unwrap_or_else(|_| unreachable!())
}
