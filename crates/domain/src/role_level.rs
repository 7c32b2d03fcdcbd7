use std::cmp::Ordering;
use std::str::FromStr;

use roleguard_core::AppError;
use serde::{Deserialize, Serialize};

/// Ordered permission level held by a principal on one resource.
///
/// Levels compare by their sparse storage value, never by declaration order,
/// so new levels can be slotted between existing ones without rewriting
/// persisted grants. Capability checks are always `level >= threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum RoleLevel {
    /// No capability at all.
    NoRole,
    /// May open the resource when handed a direct reference.
    Observer,
    /// May find the resource through public listings and search.
    Discover,
    /// May add content to the resource.
    Contributor,
    /// May edit and reorganize the resource.
    Manager,
    /// Full control, including role management.
    Owner,
}

impl RoleLevel {
    /// Returns the persisted integer for this level.
    #[must_use]
    pub fn storage_value(&self) -> i32 {
        match self {
            Self::NoRole => 0,
            Self::Observer => 100,
            Self::Discover => 200,
            Self::Contributor => 400,
            Self::Manager => 700,
            Self::Owner => 1000,
        }
    }

    /// Decodes a persisted integer.
    ///
    /// Values outside the enumeration mean the stored document is corrupt.
    pub fn from_storage_value(value: i32) -> Result<Self, AppError> {
        Self::all()
            .iter()
            .copied()
            .find(|level| level.storage_value() == value)
            .ok_or_else(|| {
                AppError::InvariantViolation(format!("unknown role level storage value '{value}'"))
            })
    }

    /// Returns a stable transport name for this level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoRole => "no_role",
            Self::Observer => "observer",
            Self::Discover => "discover",
            Self::Contributor => "contributor",
            Self::Manager => "manager",
            Self::Owner => "owner",
        }
    }

    /// Returns all known levels from lowest to highest.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[RoleLevel] = &[
            RoleLevel::NoRole,
            RoleLevel::Observer,
            RoleLevel::Discover,
            RoleLevel::Contributor,
            RoleLevel::Manager,
            RoleLevel::Owner,
        ];

        ALL
    }

    /// Parses a transport value into a level.
    pub fn from_transport(value: &str) -> Result<Self, AppError> {
        Self::from_str(value)
    }
}

impl PartialOrd for RoleLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RoleLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.storage_value().cmp(&other.storage_value())
    }
}

impl TryFrom<i32> for RoleLevel {
    type Error = AppError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_storage_value(value)
    }
}

impl From<RoleLevel> for i32 {
    fn from(value: RoleLevel) -> Self {
        value.storage_value()
    }
}

impl FromStr for RoleLevel {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "no_role" => Ok(Self::NoRole),
            "observer" => Ok(Self::Observer),
            "discover" => Ok(Self::Discover),
            "contributor" => Ok(Self::Contributor),
            "manager" => Ok(Self::Manager),
            "owner" => Ok(Self::Owner),
            _ => Err(AppError::Validation(format!(
                "unknown role level value '{value}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use roleguard_core::AppError;

    use super::RoleLevel;

    #[test]
    fn levels_are_ordered_lowest_to_highest() {
        let levels = RoleLevel::all();
        for pair in levels.windows(2) {
            assert!(pair[0] < pair[1], "{:?} should be below {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn storage_values_leave_room_between_levels() {
        for pair in RoleLevel::all().windows(2) {
            assert!(pair[1].storage_value() - pair[0].storage_value() >= 100);
        }
        assert_eq!(RoleLevel::Owner.storage_value(), 1000);
    }

    #[test]
    fn transport_names_parse_back() {
        for level in RoleLevel::all() {
            let parsed = RoleLevel::from_str(level.as_str());
            assert_eq!(parsed.ok(), Some(*level));
        }
    }

    #[test]
    fn unknown_storage_value_is_an_invariant_violation() {
        let decoded = RoleLevel::from_storage_value(150);
        assert!(matches!(decoded, Err(AppError::InvariantViolation(_))));
    }

    #[test]
    fn serde_uses_storage_integer() {
        let encoded = serde_json::to_string(&RoleLevel::Manager);
        assert_eq!(encoded.ok().as_deref(), Some("700"));

        let decoded = serde_json::from_str::<RoleLevel>("1000");
        assert_eq!(decoded.ok(), Some(RoleLevel::Owner));

        let rejected = serde_json::from_str::<RoleLevel>("42");
        assert!(rejected.is_err());
    }
}
