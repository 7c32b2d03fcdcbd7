use roleguard_core::{AppResult, Principal, PrincipalId};
use roleguard_domain::{AccessPredicate, LevelExpression, RoleLevel};

use crate::{QueryStage, StageFilter};

use super::RoleAuthority;

/// Alias under which authorization stages keep the computed effective level.
pub const EFFECTIVE_LEVEL_ALIAS: &str = "effective_level";

impl RoleAuthority {
    /// Builds stages restricting any listing to resources where the
    /// principal's effective level reaches `threshold`.
    ///
    /// The fragment may be placed before or after caller filters but must
    /// precede skip/limit.
    pub async fn build_authorization_stages(
        &self,
        principal: &Principal,
        threshold: RoleLevel,
    ) -> AppResult<Vec<QueryStage>> {
        let group_ids = self.resolve_groups(principal).await?;
        Ok(Self::authorization_stages_for(principal, &group_ids, threshold))
    }

    /// Builds authorization stages for already resolved groups.
    #[must_use]
    pub fn authorization_stages_for(
        principal: &Principal,
        group_ids: &[String],
        threshold: RoleLevel,
    ) -> Vec<QueryStage> {
        vec![
            QueryStage::PopulateRole,
            QueryStage::ComputeLevel {
                alias: EFFECTIVE_LEVEL_ALIAS.to_owned(),
                expression: LevelExpression::effective_level(principal, group_ids),
            },
            QueryStage::Match(StageFilter::LevelAtLeast {
                alias: EFFECTIVE_LEVEL_ALIAS.to_owned(),
                threshold,
            }),
        ]
    }

    /// Builds stages restricting a listing to resources `target_id` owns.
    ///
    /// Answers "does this principal own it", not "may the caller see it";
    /// combine with the caller's authorization stages.
    #[must_use]
    pub fn build_owner_filter_stages(&self, target_id: &PrincipalId) -> Vec<QueryStage> {
        vec![
            QueryStage::PopulateRole,
            QueryStage::Match(StageFilter::Access(AccessPredicate::owner(target_id))),
        ]
    }
}
