//! PostgreSQL-backed role repository.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roleguard_application::RoleRepository;
use roleguard_core::{AppError, AppResult, PrincipalId};
use roleguard_domain::{PersistedRoleRecord, RoleId, RoleLevel, RoleRecord};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::debug;


/// PostgreSQL implementation of the role repository port.
///
/// Grants live in `jsonb` maps keyed by principal id. Single-grant updates use
/// `jsonb_set` and key removal in one `UPDATE`, never read-modify-write.
#[derive(Clone)]
pub struct PostgresRoleRepository {
    pool: PgPool,
}

impl PostgresRoleRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RoleRow {
    pub(crate) id: uuid::Uuid,
    pub(crate) default_level: i32,
    pub(crate) user_grants: Json<BTreeMap<String, i32>>,
    pub(crate) group_grants: Json<BTreeMap<String, i32>>,
    pub(crate) creator_id: String,
    pub(crate) duplicate_threshold: i32,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl RoleRow {
    pub(crate) fn into_record(self) -> AppResult<RoleRecord> {
        let role_id = self.id;
        let invalid = |error: AppError| {
            AppError::InvariantViolation(format!("role '{role_id}' holds invalid data: {error}"))
        };

        let mut user_grants = BTreeMap::new();
        for (principal_id, level) in self.user_grants.0 {
            user_grants.insert(
                PrincipalId::new(principal_id).map_err(invalid)?,
                RoleLevel::from_storage_value(level).map_err(invalid)?,
            );
        }

        let mut group_grants = BTreeMap::new();
        for (group_id, level) in self.group_grants.0 {
            group_grants.insert(
                group_id,
                RoleLevel::from_storage_value(level).map_err(invalid)?,
            );
        }

        Ok(RoleRecord::restore(PersistedRoleRecord {
            id: RoleId::from_uuid(self.id),
            default_level: RoleLevel::from_storage_value(self.default_level).map_err(invalid)?,
            user_grants,
            group_grants,
            creator_id: PrincipalId::new(self.creator_id).map_err(invalid)?,
            duplicate_threshold: RoleLevel::from_storage_value(self.duplicate_threshold)
                .map_err(invalid)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }))
    }
}

fn storage_grants<K: AsRef<str>>(grants: &BTreeMap<K, RoleLevel>) -> Json<BTreeMap<String, i32>> {
    Json(
        grants
            .iter()
            .map(|(key, level)| (key.as_ref().to_owned(), level.storage_value()))
            .collect(),
    )
}

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    async fn create_role(&self, role: RoleRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO resource_roles (
                id, default_level, user_grants, group_grants,
                creator_id, duplicate_threshold, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(role.id().as_uuid())
        .bind(role.default_level().storage_value())
        .bind(storage_grants(role.user_grants()))
        .bind(storage_grants(role.group_grants()))
        .bind(role.creator_id().as_str())
        .bind(role.duplicate_threshold().storage_value())
        .bind(role.created_at())
        .bind(role.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|error| role_conflict_or_internal(error, role.id()))?;

        debug!(role_id = %role.id(), "role record stored");
        Ok(())
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<RoleRecord>> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, default_level, user_grants, group_grants,
                   creator_id, duplicate_threshold, created_at, updated_at
            FROM resource_roles
            WHERE id = $1
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find role '{role_id}': {error}")))?;

        row.map(RoleRow::into_record).transpose()
    }

    async fn set_user_level(
        &self,
        role_id: RoleId,
        principal_id: &PrincipalId,
        level: RoleLevel,
    ) -> AppResult<RoleRecord> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            UPDATE resource_roles
            SET user_grants = jsonb_set(user_grants, ARRAY[$2::text], to_jsonb($3::integer), true),
                updated_at = now()
            WHERE id = $1
            RETURNING id, default_level, user_grants, group_grants,
                      creator_id, duplicate_threshold, created_at, updated_at
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(principal_id.as_str())
        .bind(level.storage_value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to set grant on role '{role_id}': {error}"
            ))
        })?
        .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))?;

        row.into_record()
    }

    async fn remove_user_level(
        &self,
        role_id: RoleId,
        principal_id: &PrincipalId,
    ) -> AppResult<RoleRecord> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            UPDATE resource_roles
            SET user_grants = user_grants - $2::text,
                updated_at = now()
            WHERE id = $1
            RETURNING id, default_level, user_grants, group_grants,
                      creator_id, duplicate_threshold, created_at, updated_at
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(principal_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to remove grant from role '{role_id}': {error}"
            ))
        })?
        .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))?;

        row.into_record()
    }

    async fn delete_role(&self, role_id: RoleId) -> AppResult<()> {
        sqlx::query("DELETE FROM resource_roles WHERE id = $1")
            .bind(role_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to delete role '{role_id}': {error}"))
            })?;

        Ok(())
    }
}

fn role_conflict_or_internal(error: sqlx::Error, role_id: RoleId) -> AppError {
    if let sqlx::Error::Database(ref database_error) = error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!("role '{role_id}' already exists"));
    }

    AppError::Internal(format!("failed to store role '{role_id}': {error}"))
}
