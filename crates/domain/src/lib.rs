//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod access_expression;
mod resource;
mod role_level;
mod role_record;

pub use access_expression::{AccessPredicate, LevelExpression};
pub use resource::{
    PersistedResourceDocument, ProtectedResource, ROLE_FIELD, ResourceDocument, ResourceId,
    ResourceKind, RoleBoundResource,
};
pub use role_level::RoleLevel;
pub use role_record::{PersistedRoleRecord, RoleId, RoleRecord};
