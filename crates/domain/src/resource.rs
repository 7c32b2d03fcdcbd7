use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use roleguard_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{RoleId, RoleRecord};

/// Stable field name under which every protected resource exposes its role.
pub const ROLE_FIELD: &str = "role";

/// Kinds of protected resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Uploaded or authored asset.
    Asset,
    /// Shared space.
    Space,
    /// Object placed inside a space.
    SpaceObject,
    /// Script attached to a space or object.
    ScriptEntity,
    /// Feedback item submitted by a user.
    UserFeedbackItem,
}

impl ResourceKind {
    /// Returns a stable storage value for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Space => "space",
            Self::SpaceObject => "space_object",
            Self::ScriptEntity => "script_entity",
            Self::UserFeedbackItem => "user_feedback_item",
        }
    }

    /// Returns all known resource kinds.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[ResourceKind] = &[
            ResourceKind::Asset,
            ResourceKind::Space,
            ResourceKind::SpaceObject,
            ResourceKind::ScriptEntity,
            ResourceKind::UserFeedbackItem,
        ];

        ALL
    }
}

impl FromStr for ResourceKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown resource kind '{value}'")))
    }
}

/// Identifier of one protected resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(Uuid);

impl ResourceId {
    /// Creates a random resource identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a resource identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Parses a transport value.
    pub fn parse(value: &str) -> AppResult<Self> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|error| AppError::Validation(format!("invalid resource id '{value}': {error}")))
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ResourceId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Stored resource with its role reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDocument {
    id: ResourceId,
    kind: ResourceKind,
    role_id: RoleId,
    data: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

/// Raw persisted shape of a resource document, used by storage adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedResourceDocument {
    /// Resource identifier.
    pub id: ResourceId,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Bound role record.
    pub role_id: RoleId,
    /// Domain payload.
    pub data: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft delete timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ResourceDocument {
    /// Creates a new resource bound to a role record.
    pub fn new(kind: ResourceKind, role_id: RoleId, data: Value) -> AppResult<Self> {
        if !data.is_object() {
            return Err(AppError::Validation(
                "resource data must be a JSON object".to_owned(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: ResourceId::new(),
            kind,
            role_id,
            data,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Rebuilds a document from storage.
    #[must_use]
    pub fn restore(persisted: PersistedResourceDocument) -> Self {
        Self {
            id: persisted.id,
            kind: persisted.kind,
            role_id: persisted.role_id,
            data: persisted.data,
            created_at: persisted.created_at,
            updated_at: persisted.updated_at,
            deleted_at: persisted.deleted_at,
        }
    }

    /// Returns the resource identifier.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Returns the resource kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns the bound role record identifier.
    #[must_use]
    pub fn role_id(&self) -> RoleId {
        self.role_id
    }

    /// Returns the domain payload.
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Returns one top-level payload field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.as_object().and_then(|data| data.get(name))
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the soft delete timestamp.
    #[must_use]
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Whether the resource has been soft deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Marks the resource as soft deleted. Repeated calls keep the first timestamp.
    pub fn mark_deleted(&mut self, deleted_at: DateTime<Utc>) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(deleted_at);
            self.updated_at = deleted_at;
        }
    }
}

/// Capability shared by every resource whose role has been populated.
pub trait ProtectedResource {
    /// Returns the resource identifier.
    fn resource_id(&self) -> ResourceId;

    /// Returns the populated role record.
    fn role(&self) -> &RoleRecord;
}

/// Resource document with its role record populated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleBoundResource {
    #[serde(flatten)]
    document: ResourceDocument,
    role: RoleRecord,
}

impl RoleBoundResource {
    /// Binds a loaded role record to its resource.
    ///
    /// A role that is not the one referenced by the document is an invariant
    /// violation.
    pub fn bind(document: ResourceDocument, role: RoleRecord) -> AppResult<Self> {
        if document.role_id() != role.id() {
            return Err(AppError::InvariantViolation(format!(
                "resource '{}' references role '{}' but was populated with role '{}'",
                document.id(),
                document.role_id(),
                role.id()
            )));
        }

        Ok(Self { document, role })
    }

    /// Returns the resource document.
    #[must_use]
    pub fn document(&self) -> &ResourceDocument {
        &self.document
    }

    /// Splits the binding into its parts.
    #[must_use]
    pub fn into_parts(self) -> (ResourceDocument, RoleRecord) {
        (self.document, self.role)
    }
}

impl ProtectedResource for RoleBoundResource {
    fn resource_id(&self) -> ResourceId {
        self.document.id()
    }

    fn role(&self) -> &RoleRecord {
        &self.role
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use roleguard_core::{AppError, PrincipalId};
    use serde_json::json;

    use super::{ROLE_FIELD, ResourceDocument, ResourceKind, RoleBoundResource};
    use crate::{RoleLevel, RoleRecord};

    fn role() -> RoleRecord {
        RoleRecord::new(
            PrincipalId::new("alice").unwrap_or_else(|_| unreachable!()),
            RoleLevel::Observer,
        )
    }

    #[test]
    fn resource_data_must_be_object() {
        let result = ResourceDocument::new(ResourceKind::Asset, role().id(), json!([1, 2]));
        assert!(result.is_err());
    }

    #[test]
    fn binding_rejects_foreign_role() {
        let document = ResourceDocument::new(ResourceKind::Space, role().id(), json!({}))
            .unwrap_or_else(|_| unreachable!());

        let bound = RoleBoundResource::bind(document, role());
        assert!(matches!(bound, Err(AppError::InvariantViolation(_))));
    }

    #[test]
    fn bound_resource_exposes_role_under_stable_field() {
        let role = role();
        let document = ResourceDocument::new(ResourceKind::Asset, role.id(), json!({"name": "tree"}))
            .unwrap_or_else(|_| unreachable!());
        let bound = RoleBoundResource::bind(document, role).unwrap_or_else(|_| unreachable!());

        let encoded = serde_json::to_value(&bound).unwrap_or_default();
        assert_eq!(encoded[ROLE_FIELD]["default_level"], 100);
        assert_eq!(encoded["kind"], "asset");
    }

    #[test]
    fn soft_delete_keeps_first_timestamp() {
        let mut document = ResourceDocument::new(ResourceKind::Asset, role().id(), json!({}))
            .unwrap_or_else(|_| unreachable!());
        let first = chrono::Utc::now();
        document.mark_deleted(first);
        document.mark_deleted(first + chrono::TimeDelta::seconds(5));

        assert_eq!(document.deleted_at(), Some(first));
    }

    #[test]
    fn resource_kind_parses_storage_value() {
        assert_eq!(
            ResourceKind::from_str("space_object").ok(),
            Some(ResourceKind::SpaceObject)
        );
        assert!(ResourceKind::from_str("planet").is_err());
    }
}
