use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use roleguard_core::PrincipalId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RoleLevel;

/// Identifier of one role record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleId(Uuid);

impl RoleId {
    /// Creates a random role identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a role identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RoleId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Per-resource role document.
///
/// Holds the level granted to everyone without an explicit entry plus the
/// explicit per-principal and per-group overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    id: RoleId,
    default_level: RoleLevel,
    user_grants: BTreeMap<PrincipalId, RoleLevel>,
    group_grants: BTreeMap<String, RoleLevel>,
    creator_id: PrincipalId,
    duplicate_threshold: RoleLevel,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Raw persisted shape of a role record, used by storage adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRoleRecord {
    /// Record identifier.
    pub id: RoleId,
    /// Level for principals without an explicit grant.
    pub default_level: RoleLevel,
    /// Explicit principal grants.
    pub user_grants: BTreeMap<PrincipalId, RoleLevel>,
    /// Explicit group grants.
    pub group_grants: BTreeMap<String, RoleLevel>,
    /// Principal that created the record.
    pub creator_id: PrincipalId,
    /// Minimum level a non-owner needs to duplicate the resource.
    pub duplicate_threshold: RoleLevel,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last grant mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl RoleRecord {
    /// Creates a role record with the creator bootstrapped as owner.
    #[must_use]
    pub fn new(creator_id: PrincipalId, default_level: RoleLevel) -> Self {
        let now = Utc::now();
        let mut user_grants = BTreeMap::new();
        user_grants.insert(creator_id.clone(), RoleLevel::Owner);

        Self {
            id: RoleId::new(),
            default_level,
            user_grants,
            group_grants: BTreeMap::new(),
            creator_id,
            duplicate_threshold: RoleLevel::Owner,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overrides the minimum level required to duplicate the resource.
    #[must_use]
    pub fn with_duplicate_threshold(mut self, duplicate_threshold: RoleLevel) -> Self {
        self.duplicate_threshold = duplicate_threshold;
        self
    }

    /// Rebuilds a record from storage.
    #[must_use]
    pub fn restore(persisted: PersistedRoleRecord) -> Self {
        Self {
            id: persisted.id,
            default_level: persisted.default_level,
            user_grants: persisted.user_grants,
            group_grants: persisted.group_grants,
            creator_id: persisted.creator_id,
            duplicate_threshold: persisted.duplicate_threshold,
            created_at: persisted.created_at,
            updated_at: persisted.updated_at,
        }
    }

    /// Returns the record identifier.
    #[must_use]
    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Returns the level granted to principals without an explicit entry.
    #[must_use]
    pub fn default_level(&self) -> RoleLevel {
        self.default_level
    }

    /// Returns explicit principal grants.
    #[must_use]
    pub fn user_grants(&self) -> &BTreeMap<PrincipalId, RoleLevel> {
        &self.user_grants
    }

    /// Returns explicit group grants.
    #[must_use]
    pub fn group_grants(&self) -> &BTreeMap<String, RoleLevel> {
        &self.group_grants
    }

    /// Returns the principal that created the record.
    #[must_use]
    pub fn creator_id(&self) -> &PrincipalId {
        &self.creator_id
    }

    /// Returns the minimum level a non-owner needs to duplicate the resource.
    #[must_use]
    pub fn duplicate_threshold(&self) -> RoleLevel {
        self.duplicate_threshold
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last grant mutation timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the explicit grant for a principal, if any.
    #[must_use]
    pub fn user_grant(&self, principal_id: &str) -> Option<RoleLevel> {
        self.user_grants.get(principal_id).copied()
    }

    /// Returns the explicit grant for a group, if any.
    #[must_use]
    pub fn group_grant(&self, group_id: &str) -> Option<RoleLevel> {
        self.group_grants.get(group_id).copied()
    }

    /// Principals holding an explicit `Owner` grant.
    #[must_use]
    pub fn owners(&self) -> Vec<&PrincipalId> {
        self.user_grants
            .iter()
            .filter_map(|(principal_id, level)| {
                (*level == RoleLevel::Owner).then_some(principal_id)
            })
            .collect()
    }

    /// Whether the resource shows up in public listings.
    #[must_use]
    pub fn is_publicly_discoverable(&self) -> bool {
        self.default_level >= RoleLevel::Discover
    }

    /// Sets one explicit principal grant.
    pub fn set_user_level(&mut self, principal_id: PrincipalId, level: RoleLevel) {
        self.user_grants.insert(principal_id, level);
        self.updated_at = Utc::now();
    }

    /// Removes one explicit principal grant and returns the previous level.
    pub fn remove_user_level(&mut self, principal_id: &str) -> Option<RoleLevel> {
        let removed = self.user_grants.remove(principal_id);
        if removed.is_some() {
            self.updated_at = Utc::now();
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use roleguard_core::PrincipalId;

    use super::RoleRecord;
    use crate::RoleLevel;

    fn principal(value: &str) -> PrincipalId {
        PrincipalId::new(value).unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn creator_is_bootstrapped_as_owner() {
        let record = RoleRecord::new(principal("alice"), RoleLevel::NoRole);

        assert_eq!(record.user_grant("alice"), Some(RoleLevel::Owner));
        assert_eq!(record.owners(), vec![&principal("alice")]);
        assert_eq!(record.duplicate_threshold(), RoleLevel::Owner);
    }

    #[test]
    fn discoverability_is_derived_from_default_level() {
        let private = RoleRecord::new(principal("alice"), RoleLevel::Observer);
        let public = RoleRecord::new(principal("alice"), RoleLevel::Discover);

        assert!(!private.is_publicly_discoverable());
        assert!(public.is_publicly_discoverable());
    }

    #[test]
    fn owners_only_lists_exact_owner_grants() {
        let mut record = RoleRecord::new(principal("alice"), RoleLevel::Owner);
        record.set_user_level(principal("bob"), RoleLevel::Manager);
        record.set_user_level(principal("carol"), RoleLevel::Owner);

        let owners: Vec<&str> = record.owners().into_iter().map(PrincipalId::as_str).collect();
        assert_eq!(owners, vec!["alice", "carol"]);
    }

    #[test]
    fn removing_missing_grant_is_a_no_op() {
        let mut record = RoleRecord::new(principal("alice"), RoleLevel::Observer);
        let updated_at = record.updated_at();

        assert_eq!(record.remove_user_level("bob"), None);
        assert_eq!(record.updated_at(), updated_at);
    }

    #[test]
    fn grants_serialize_as_storage_integers() {
        let record = RoleRecord::new(principal("alice"), RoleLevel::Discover);
        let encoded = serde_json::to_value(&record).unwrap_or_default();

        assert_eq!(encoded["user_grants"]["alice"], 1000);
        assert_eq!(encoded["default_level"], 200);
    }
}
