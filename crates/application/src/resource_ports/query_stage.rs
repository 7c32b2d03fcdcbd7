use roleguard_core::{AppError, AppResult};
use roleguard_domain::{AccessPredicate, LevelExpression, RoleLevel};
use serde_json::Value;

/// One step of a resource listing pipeline.
///
/// Stages run in order, the way a document-store aggregation runs. Storage
/// adapters either interpret them in-process or compile them into a single
/// query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryStage {
    /// Joins each resource with its role record.
    PopulateRole,
    /// Evaluates a level expression per resource and keeps it under `alias`.
    ComputeLevel {
        /// Name later stages use to reference the computed level.
        alias: String,
        /// Expression evaluated against the populated role.
        expression: LevelExpression,
    },
    /// Drops resources that do not satisfy the filter.
    Match(StageFilter),
    /// Orders resources. Ties always break on resource id.
    Sort(Vec<ResourceSort>),
    /// Skips a number of resources.
    Skip(usize),
    /// Caps the number of returned resources.
    Limit(usize),
}

impl QueryStage {
    /// Returns whether this stage only shapes the page instead of the matched set.
    #[must_use]
    pub fn is_paging(&self) -> bool {
        matches!(self, Self::Sort(_) | Self::Skip(_) | Self::Limit(_))
    }
}

/// Filter evaluated by a `Match` stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageFilter {
    /// Level computed under `alias` is at least `threshold`.
    LevelAtLeast {
        /// Alias of an earlier `ComputeLevel` stage.
        alias: String,
        /// Inclusive lower bound.
        threshold: RoleLevel,
    },
    /// Predicate over the populated role.
    Access(AccessPredicate),
    /// Top-level payload field equals a JSON value.
    DataEquals {
        /// Payload field name.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// Top-level payload field equals one of the JSON values.
    DataIn {
        /// Payload field name.
        field: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// Resource is not soft deleted.
    ExcludeDeleted,
    /// Every child filter holds. Empty is `true`.
    All(Vec<StageFilter>),
    /// Any child filter holds. Empty is `false`.
    Any(Vec<StageFilter>),
}

impl StageFilter {
    /// Shorthand for `DataEquals`.
    #[must_use]
    pub fn data_equals(field: impl Into<String>, value: Value) -> Self {
        Self::DataEquals {
            field: field.into(),
            value,
        }
    }

    /// Returns whether the filter reads the populated role.
    #[must_use]
    pub fn reads_role(&self) -> bool {
        match self {
            Self::LevelAtLeast { .. } | Self::Access(_) => true,
            Self::DataEquals { .. } | Self::DataIn { .. } | Self::ExcludeDeleted => false,
            Self::All(filters) | Self::Any(filters) => filters.iter().any(Self::reads_role),
        }
    }

    pub(crate) fn referenced_aliases<'a>(&'a self, aliases: &mut Vec<&'a str>) {
        match self {
            Self::LevelAtLeast { alias, .. } => aliases.push(alias.as_str()),
            Self::All(filters) | Self::Any(filters) => {
                for filter in filters {
                    filter.referenced_aliases(aliases);
                }
            }
            Self::Access(_) | Self::DataEquals { .. } | Self::DataIn { .. } | Self::ExcludeDeleted => {}
        }
    }
}

/// Sort key for resource listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    /// Creation timestamp.
    CreatedAt,
    /// Last update timestamp.
    UpdatedAt,
    /// Top-level payload field.
    Data(String),
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending sort direction.
    Asc,
    /// Descending sort direction.
    Desc,
}

impl SortDirection {
    /// Parses transport value into sort direction.
    pub fn parse_transport(value: &str) -> AppResult<Self> {
        match value {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(AppError::Validation(format!(
                "unknown sort direction '{value}'"
            ))),
        }
    }

    /// Returns the stable transport value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// One sort instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSort {
    /// Sort key.
    pub key: SortKey,
    /// Sort direction.
    pub direction: SortDirection,
}

impl ResourceSort {
    /// Creates a sort instruction.
    #[must_use]
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }
}
