use std::collections::BTreeSet;

use roleguard_core::{AppError, AppResult};
use roleguard_domain::ResourceKind;

use super::{QueryStage, ResourceSort, StageFilter};

/// Ordered listing query over one resource collection.
///
/// Authorization stages are plain stages; callers splice them next to their
/// own filters. Every filtering stage must come before `Skip`/`Limit` so page
/// offsets and totals are computed over the authorized set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePipeline {
    kind: ResourceKind,
    stages: Vec<QueryStage>,
}

impl ResourcePipeline {
    /// Starts an empty pipeline over one collection.
    #[must_use]
    pub fn for_kind(kind: ResourceKind) -> Self {
        Self {
            kind,
            stages: Vec::new(),
        }
    }

    /// Appends a fragment of stages.
    #[must_use]
    pub fn with_stages(mut self, stages: impl IntoIterator<Item = QueryStage>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Appends a `Match` stage.
    #[must_use]
    pub fn filter(mut self, filter: StageFilter) -> Self {
        self.stages.push(QueryStage::Match(filter));
        self
    }

    /// Appends a `Sort` stage. Empty sorts are ignored.
    #[must_use]
    pub fn sort(mut self, sorts: Vec<ResourceSort>) -> Self {
        if !sorts.is_empty() {
            self.stages.push(QueryStage::Sort(sorts));
        }
        self
    }

    /// Appends `Skip` and `Limit` stages.
    #[must_use]
    pub fn page(mut self, skip: usize, limit: usize) -> Self {
        self.stages.push(QueryStage::Skip(skip));
        self.stages.push(QueryStage::Limit(limit));
        self
    }

    /// Returns the collection this pipeline lists.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[QueryStage] {
        &self.stages
    }

    /// Returns a copy without sort and paging stages, used for total counts.
    #[must_use]
    pub fn counting(&self) -> Self {
        Self {
            kind: self.kind,
            stages: self
                .stages
                .iter()
                .filter(|stage| !stage.is_paging())
                .cloned()
                .collect(),
        }
    }

    /// Checks stage ordering.
    ///
    /// Rejects filtering or sorting after paging, role reads before the role
    /// is populated, and level filters on aliases never computed.
    pub fn validate(&self) -> AppResult<()> {
        let mut paged = false;
        let mut role_populated = false;
        let mut computed_aliases = BTreeSet::new();

        for (index, stage) in self.stages.iter().enumerate() {
            match stage {
                QueryStage::PopulateRole => role_populated = true,
                QueryStage::ComputeLevel { alias, .. } => {
                    if paged {
                        return Err(stage_after_paging(index, "compute level"));
                    }
                    if !role_populated {
                        return Err(role_not_populated(index));
                    }
                    computed_aliases.insert(alias.as_str());
                }
                QueryStage::Match(filter) => {
                    if paged {
                        return Err(stage_after_paging(index, "match"));
                    }
                    if filter.reads_role() && !role_populated {
                        return Err(role_not_populated(index));
                    }

                    let mut aliases = Vec::new();
                    filter.referenced_aliases(&mut aliases);
                    if let Some(alias) = aliases
                        .into_iter()
                        .find(|alias| !computed_aliases.contains(alias))
                    {
                        return Err(AppError::Validation(format!(
                            "pipeline stage {index} filters on level alias '{alias}' that no earlier stage computes"
                        )));
                    }
                }
                QueryStage::Sort(_) => {
                    if paged {
                        return Err(stage_after_paging(index, "sort"));
                    }
                }
                QueryStage::Skip(_) | QueryStage::Limit(_) => paged = true,
            }
        }

        Ok(())
    }
}

fn stage_after_paging(index: usize, stage_name: &str) -> AppError {
    AppError::Validation(format!(
        "pipeline stage {index} ({stage_name}) must run before skip/limit"
    ))
}

fn role_not_populated(index: usize) -> AppError {
    AppError::Validation(format!(
        "pipeline stage {index} reads the role before it is populated"
    ))
}
