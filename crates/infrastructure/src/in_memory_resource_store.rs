//! In-memory resource store joined against an in-memory role repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roleguard_application::{ResourcePipeline, ResourceStore, RoleRepository, evaluate_pipeline};
use roleguard_core::{AppError, AppResult};
use roleguard_domain::{ResourceDocument, ResourceId, RoleBoundResource};
use tokio::sync::RwLock;
use tracing::debug;

use crate::InMemoryRoleRepository;


/// Resource store keeping documents in process memory.
///
/// Pipelines run through the shared in-process evaluator, so bulk listings
/// apply exactly the expression trees single-entity checks evaluate.
#[derive(Debug)]
pub struct InMemoryResourceStore {
    roles: Arc<InMemoryRoleRepository>,
    documents: RwLock<HashMap<ResourceId, ResourceDocument>>,
}

impl InMemoryResourceStore {
    /// Creates an empty store reading roles from `roles`.
    #[must_use]
    pub fn new(roles: Arc<InMemoryRoleRepository>) -> Self {
        Self {
            roles,
            documents: RwLock::new(HashMap::new()),
        }
    }

    async fn bind(&self, document: ResourceDocument) -> AppResult<RoleBoundResource> {
        let role = self
            .roles
            .find_role(document.role_id())
            .await?
            .ok_or_else(|| {
                AppError::InvariantViolation(format!(
                    "resource '{}' references missing role '{}'",
                    document.id(),
                    document.role_id()
                ))
            })?;

        RoleBoundResource::bind(document, role)
    }

    async fn candidates(&self, pipeline: &ResourcePipeline) -> AppResult<Vec<RoleBoundResource>> {
        let documents: Vec<ResourceDocument> = self
            .documents
            .read()
            .await
            .values()
            .filter(|document| document.kind() == pipeline.kind())
            .cloned()
            .collect();

        let mut bound = Vec::with_capacity(documents.len());
        for document in documents {
            bound.push(self.bind(document).await?);
        }

        Ok(bound)
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn insert_resource(&self, document: ResourceDocument) -> AppResult<()> {
        if self.roles.find_role(document.role_id()).await?.is_none() {
            return Err(AppError::InvariantViolation(format!(
                "resource '{}' references missing role '{}'",
                document.id(),
                document.role_id()
            )));
        }

        let mut documents = self.documents.write().await;
        if documents.contains_key(&document.id()) {
            return Err(AppError::Conflict(format!(
                "resource '{}' already exists",
                document.id()
            )));
        }

        documents.insert(document.id(), document);
        Ok(())
    }

    async fn find_resource(&self, resource_id: ResourceId) -> AppResult<Option<RoleBoundResource>> {
        let document = self.documents.read().await.get(&resource_id).cloned();
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
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(&resource_id)
            .ok_or_else(|| AppError::NotFound(format!("resource '{resource_id}'")))?;

        document.mark_deleted(deleted_at);
        Ok(())
    }

    async fn delete_resource(&self, resource_id: ResourceId) -> AppResult<()> {
        self.documents
            .write()
            .await
            .remove(&resource_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("resource '{resource_id}'")))
    }

    async fn run_pipeline(
        &self,
        pipeline: &ResourcePipeline,
    ) -> AppResult<Vec<RoleBoundResource>> {
        let candidates = self.candidates(pipeline).await?;
        debug!(
            kind = pipeline.kind().as_str(),
            candidates = candidates.len(),
            stages = pipeline.stages().len(),
            "running in-memory resource pipeline"
        );

        evaluate_pipeline(pipeline, candidates)
    }

    async fn count_pipeline(&self, pipeline: &ResourcePipeline) -> AppResult<u64> {
        let counted = pipeline.counting();
        let candidates = self.candidates(&counted).await?;
        let matched = evaluate_pipeline(&counted, candidates)?;

        u64::try_from(matched.len())
            .map_err(|error| AppError::Internal(format!("failed to count resources: {error}")))
    }
}
