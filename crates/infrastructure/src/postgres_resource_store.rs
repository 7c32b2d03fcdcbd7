//! PostgreSQL-backed resource store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roleguard_application::{ResourcePipeline, ResourceStore};
use roleguard_core::{AppError, AppResult};
use roleguard_domain::{
    PersistedResourceDocument, ResourceDocument, ResourceId, ResourceKind, RoleBoundResource,
    RoleId,
};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::debug;

use crate::postgres_role_repository::RoleRow;

mod pipeline_sql;

#[cfg(test)]
mod tests;

use pipeline_sql::{PipelineOutput, build_pipeline_query};

/// Resource columns joined with the bound role, aliased for [`ResourceRow`].
pub(crate) const RESOURCE_COLUMNS: &str = r#"
    resource.id, resource.kind, resource.role_id, resource.data,
    resource.created_at, resource.updated_at, resource.deleted_at,
    resource_role.default_level AS role_default_level,
    resource_role.user_grants AS role_user_grants,
    resource_role.group_grants AS role_group_grants,
    resource_role.creator_id AS role_creator_id,
    resource_role.duplicate_threshold AS role_duplicate_threshold,
    resource_role.created_at AS role_created_at,
    resource_role.updated_at AS role_updated_at
"#;

/// Resource table joined with role records. Dangling references keep their row.
pub(crate) const RESOURCE_SOURCE: &str = r#"
    FROM protected_resources resource
    LEFT JOIN resource_roles resource_role ON resource_role.id = resource.role_id
"#;

/// PostgreSQL implementation of the resource store port.
///
/// Pipelines compile into one SQL statement over the resource/role join, so
/// authorization filters run inside the database before paging.
#[derive(Clone)]
pub struct PostgresResourceStore {
    pool: PgPool,
}

impl PostgresResourceStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ResourceRow {
    id: uuid::Uuid,
    kind: String,
    role_id: uuid::Uuid,
    data: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    role_default_level: Option<i32>,
    role_user_grants: Option<Json<BTreeMap<String, i32>>>,
    role_group_grants: Option<Json<BTreeMap<String, i32>>>,
    role_creator_id: Option<String>,
    role_duplicate_threshold: Option<i32>,
    role_created_at: Option<DateTime<Utc>>,
    role_updated_at: Option<DateTime<Utc>>,
}

impl ResourceRow {
    fn into_bound(self) -> AppResult<RoleBoundResource> {
        let kind = self.kind.parse::<ResourceKind>().map_err(|error| {
            AppError::InvariantViolation(format!(
                "resource '{}' holds invalid kind: {error}",
                self.id
            ))
        })?;

        let role = match (
            self.role_default_level,
            self.role_user_grants,
            self.role_group_grants,
            self.role_creator_id,
            self.role_duplicate_threshold,
            self.role_created_at,
            self.role_updated_at,
        ) {
            (
                Some(default_level),
                Some(user_grants),
                Some(group_grants),
                Some(creator_id),
                Some(duplicate_threshold),
                Some(created_at),
                Some(updated_at),
            ) => RoleRow {
                id: self.role_id,
                default_level,
                user_grants,
                group_grants,
                creator_id,
                duplicate_threshold,
                created_at,
                updated_at,
            }
            .into_record()?,
            _ => {
                return Err(AppError::InvariantViolation(format!(
                    "resource '{}' references missing role '{}'",
                    self.id, self.role_id
                )));
            }
        };

        let document = ResourceDocument::restore(PersistedResourceDocument {
            id: ResourceId::from_uuid(self.id),
            kind,
            role_id: RoleId::from_uuid(self.role_id),
            data: self.data,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        });

        RoleBoundResource::bind(document, role)
    }
}

#[async_trait]
impl ResourceStore for PostgresResourceStore {
    async fn insert_resource(&self, document: ResourceDocument) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO protected_resources (
                id, kind, role_id, data, created_at, updated_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(document.id().as_uuid())
        .bind(document.kind().as_str())
        .bind(document.role_id().as_uuid())
        .bind(document.data())
        .bind(document.created_at())
        .bind(document.updated_at())
        .bind(document.deleted_at())
        .execute(&self.pool)
        .await
        .map_err(|error| insert_error(error, &document))?;

        debug!(resource_id = %document.id(), kind = document.kind().as_str(), "resource stored");
        Ok(())
    }

    async fn find_resource(&self, resource_id: ResourceId) -> AppResult<Option<RoleBoundResource>> {
        let row = sqlx::query_as::<_, ResourceRow>(&format!(
            "SELECT {RESOURCE_COLUMNS} {RESOURCE_SOURCE} WHERE resource.id = $1"
        ))
        .bind(resource_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find resource '{resource_id}': {error}"))
        })?;

        row.map(ResourceRow::into_bound).transpose()
    }

    async fn mark_deleted(
        &self,
        resource_id: ResourceId,
        deleted_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE protected_resources
            SET deleted_at = COALESCE(deleted_at, $2)
            WHERE id = $1
            "#,
        )
        .bind(resource_id.as_uuid())
        .bind(deleted_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to soft delete resource '{resource_id}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("resource '{resource_id}'")));
        }

        Ok(())
    }

    async fn delete_resource(&self, resource_id: ResourceId) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM protected_resources WHERE id = $1")
            .bind(resource_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to delete resource '{resource_id}': {error}"
                ))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("resource '{resource_id}'")));
        }

        Ok(())
    }

    async fn run_pipeline(
        &self,
        pipeline: &ResourcePipeline,
    ) -> AppResult<Vec<RoleBoundResource>> {
        let mut builder = build_pipeline_query(pipeline, PipelineOutput::Rows)?;
        debug!(
            kind = pipeline.kind().as_str(),
            stages = pipeline.stages().len(),
            "running postgres resource pipeline"
        );

        let rows = builder
            .build_query_as::<ResourceRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to run resource pipeline: {error}"))
            })?;

        rows.into_iter().map(ResourceRow::into_bound).collect()
    }

    async fn count_pipeline(&self, pipeline: &ResourcePipeline) -> AppResult<u64> {
        let mut builder = build_pipeline_query(&pipeline.counting(), PipelineOutput::Count)?;
        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to count resource pipeline: {error}"))
            })?;

        u64::try_from(count)
            .map_err(|error| AppError::Internal(format!("invalid resource count: {error}")))
    }
}

fn insert_error(error: sqlx::Error, document: &ResourceDocument) -> AppError {
    if let sqlx::Error::Database(ref database_error) = error {
        match database_error.code().as_deref() {
            Some("23505") => {
                return AppError::Conflict(format!(
                    "resource '{}' already exists",
                    document.id()
                ));
            }
            Some("23503") => {
                return AppError::InvariantViolation(format!(
                    "resource '{}' references missing role '{}'",
                    document.id(),
                    document.role_id()
                ));
            }
            _ => {}
        }
    }

    AppError::Internal(format!(
        "failed to store resource '{}': {error}",
        document.id()
    ))
}
