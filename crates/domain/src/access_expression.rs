use roleguard_core::{Principal, PrincipalId};
use serde::{Deserialize, Serialize};

use crate::{RoleLevel, RoleRecord};

/// Data-independent expression resolving to a level for one role record.
///
/// The same tree is evaluated in-process for single resources and compiled
/// into query language by storage adapters for bulk listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelExpression {
    /// The record's default level.
    DefaultLevel,
    /// Explicit grant for a principal, `NoRole` when absent.
    UserGrant(PrincipalId),
    /// Explicit grant for a group, `NoRole` when absent.
    GroupGrant(String),
    /// A fixed level.
    Constant(RoleLevel),
    /// Highest level of all operands, `NoRole` when empty.
    Max(Vec<LevelExpression>),
}

impl LevelExpression {
    /// Builds `max(defaultLevel, grantFor(principal), groupGrants...)`.
    #[must_use]
    pub fn effective_level(principal: &Principal, group_ids: &[String]) -> Self {
        let explicit = match principal.id() {
            Some(principal_id) => Self::UserGrant(principal_id.clone()),
            None => Self::Constant(RoleLevel::NoRole),
        };

        let mut operands = vec![Self::DefaultLevel, explicit];
        operands.extend(group_ids.iter().cloned().map(Self::GroupGrant));

        Self::Max(operands)
    }

    /// Evaluates the expression against a loaded role record.
    #[must_use]
    pub fn evaluate(&self, role: &RoleRecord) -> RoleLevel {
        match self {
            Self::DefaultLevel => role.default_level(),
            Self::UserGrant(principal_id) => role
                .user_grant(principal_id.as_str())
                .unwrap_or(RoleLevel::NoRole),
            Self::GroupGrant(group_id) => role
                .group_grant(group_id.as_str())
                .unwrap_or(RoleLevel::NoRole),
            Self::Constant(level) => *level,
            Self::Max(operands) => operands
                .iter()
                .map(|operand| operand.evaluate(role))
                .max()
                .unwrap_or(RoleLevel::NoRole),
        }
    }
}

/// Boolean predicate over one role record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPredicate {
    /// Expression value is at least the threshold.
    AtLeast {
        /// Level expression to compare.
        expression: LevelExpression,
        /// Inclusive lower bound.
        threshold: RoleLevel,
    },
    /// Explicit principal grant equals the level exactly.
    ///
    /// Ignores the default level and groups.
    ExplicitUserGrantIs {
        /// Principal whose explicit grant is inspected.
        principal_id: PrincipalId,
        /// Required exact level.
        level: RoleLevel,
    },
    /// Every child predicate holds. Empty is `true`.
    All(Vec<AccessPredicate>),
}

impl AccessPredicate {
    /// Capability predicate: effective level of the principal reaches `threshold`.
    #[must_use]
    pub fn at_least(principal: &Principal, group_ids: &[String], threshold: RoleLevel) -> Self {
        Self::AtLeast {
            expression: LevelExpression::effective_level(principal, group_ids),
            threshold,
        }
    }

    /// Ownership predicate: the principal holds an explicit `Owner` grant.
    #[must_use]
    pub fn owner(principal_id: &PrincipalId) -> Self {
        Self::ExplicitUserGrantIs {
            principal_id: principal_id.clone(),
            level: RoleLevel::Owner,
        }
    }

    /// Evaluates the predicate against a loaded role record.
    #[must_use]
    pub fn evaluate(&self, role: &RoleRecord) -> bool {
        match self {
            Self::AtLeast {
                expression,
                threshold,
            } => expression.evaluate(role) >= *threshold,
            Self::ExplicitUserGrantIs {
                principal_id,
                level,
            } => role.user_grant(principal_id.as_str()) == Some(*level),
            Self::All(predicates) => predicates.iter().all(|predicate| predicate.evaluate(role)),
        }
    }
}
