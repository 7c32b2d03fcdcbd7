use std::collections::HashMap;

use roleguard_application::{
    QueryStage, ResourcePipeline, ResourceSort, SortDirection, SortKey, StageFilter,
};
use roleguard_core::{AppError, AppResult};
use roleguard_domain::{AccessPredicate, LevelExpression, RoleLevel};
use sqlx::{Postgres, QueryBuilder};

use super::{RESOURCE_COLUMNS, RESOURCE_SOURCE};

/// Shape of the compiled statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PipelineOutput {
    /// Resource rows joined with their role records.
    Rows,
    /// A single `COUNT(*)` value.
    Count,
}

/// Offset and limit folded from consecutive skip/limit stages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PageWindow {
    offset: usize,
    limit: Option<usize>,
}

impl PageWindow {
    fn skip(&mut self, count: usize) {
        self.offset = self.offset.saturating_add(count);
        self.limit = self.limit.map(|limit| limit.saturating_sub(count));
    }

    fn limit(&mut self, count: usize) {
        self.limit = Some(self.limit.map_or(count, |limit| limit.min(count)));
    }
}

/// Compiles a pipeline into one statement over the resource/role join.
///
/// Computed level aliases are inlined at the match stages that read them.
/// Results are ordered by the last sort stage with resource id as tie-breaker.
pub(super) fn build_pipeline_query(
    pipeline: &ResourcePipeline,
    output: PipelineOutput,
) -> AppResult<QueryBuilder<'static, Postgres>> {
    pipeline.validate()?;

    let mut builder: QueryBuilder<'static, Postgres> = QueryBuilder::new("SELECT ");
    match output {
        PipelineOutput::Rows => builder.push(RESOURCE_COLUMNS),
        PipelineOutput::Count => builder.push("COUNT(*)"),
    };
    builder.push(RESOURCE_SOURCE);
    builder.push(" WHERE resource.kind = ");
    builder.push_bind(pipeline.kind().as_str());

    let mut aliases: HashMap<&str, &LevelExpression> = HashMap::new();
    let mut sorts: &[ResourceSort] = &[];
    let mut window = PageWindow::default();

    for stage in pipeline.stages() {
        match stage {
            QueryStage::PopulateRole => {}
            QueryStage::ComputeLevel { alias, expression } => {
                aliases.insert(alias.as_str(), expression);
            }
            QueryStage::Match(filter) => {
                builder.push(" AND ");
                push_filter(&mut builder, filter, &aliases)?;
            }
            QueryStage::Sort(stage_sorts) => sorts = stage_sorts.as_slice(),
            QueryStage::Skip(count) => window.skip(*count),
            QueryStage::Limit(count) => window.limit(*count),
        }
    }

    if output == PipelineOutput::Count {
        return Ok(builder);
    }

    builder.push(" ORDER BY ");
    for sort in sorts {
        push_sort(&mut builder, sort);
        builder.push(", ");
    }
    builder.push("resource.id ASC");

    if let Some(limit) = window.limit {
        builder.push(" LIMIT ");
        builder.push_bind(to_sql_count(limit, "limit")?);
    }
    if window.offset > 0 {
        builder.push(" OFFSET ");
        builder.push_bind(to_sql_count(window.offset, "offset")?);
    }

    Ok(builder)
}

fn to_sql_count(value: usize, label: &str) -> AppResult<i64> {
    i64::try_from(value)
        .map_err(|error| AppError::Validation(format!("invalid pipeline {label}: {error}")))
}

fn push_filter(
    builder: &mut QueryBuilder<'static, Postgres>,
    filter: &StageFilter,
    aliases: &HashMap<&str, &LevelExpression>,
) -> AppResult<()> {
    match filter {
        StageFilter::LevelAtLeast { alias, threshold } => {
            let expression = aliases.get(alias.as_str()).ok_or_else(|| {
                AppError::Validation(format!("level alias '{alias}' is not computed"))
            })?;
            push_at_least(builder, expression, *threshold);
        }
        StageFilter::Access(predicate) => push_predicate(builder, predicate),
        StageFilter::DataEquals { field, value } => {
            builder.push("(resource.data -> ");
            builder.push_bind(field.clone());
            builder.push("::text) = ");
            builder.push_bind(value.clone());
        }
        StageFilter::DataIn { field, values } => {
            if values.is_empty() {
                builder.push("FALSE");
            } else {
                builder.push("(resource.data -> ");
                builder.push_bind(field.clone());
                builder.push("::text) = ANY(");
                builder.push_bind(values.clone());
                builder.push(")");
            }
        }
        StageFilter::ExcludeDeleted => {
            builder.push("resource.deleted_at IS NULL");
        }
        StageFilter::All(filters) => {
            builder.push("(TRUE");
            for nested in filters {
                builder.push(" AND ");
                push_filter(builder, nested, aliases)?;
            }
            builder.push(")");
        }
        StageFilter::Any(filters) => {
            builder.push("(FALSE");
            for nested in filters {
                builder.push(" OR ");
                push_filter(builder, nested, aliases)?;
            }
            builder.push(")");
        }
    }

    Ok(())
}

fn push_predicate(builder: &mut QueryBuilder<'static, Postgres>, predicate: &AccessPredicate) {
    match predicate {
        AccessPredicate::AtLeast {
            expression,
            threshold,
        } => push_at_least(builder, expression, *threshold),
        AccessPredicate::ExplicitUserGrantIs {
            principal_id,
            level,
        } => {
            builder.push("COALESCE((resource_role.user_grants ->> ");
            builder.push_bind(principal_id.as_str().to_owned());
            builder.push("::text)::integer = ");
            builder.push_bind(level.storage_value());
            builder.push("::integer, FALSE)");
        }
        AccessPredicate::All(predicates) => {
            builder.push("(TRUE");
            for nested in predicates {
                builder.push(" AND ");
                push_predicate(builder, nested);
            }
            builder.push(")");
        }
    }
}

fn push_at_least(
    builder: &mut QueryBuilder<'static, Postgres>,
    expression: &LevelExpression,
    threshold: RoleLevel,
) {
    builder.push("(");
    push_level_expression(builder, expression);
    builder.push(" >= ");
    builder.push_bind(threshold.storage_value());
    builder.push("::integer)");
}

fn push_level_expression(builder: &mut QueryBuilder<'static, Postgres>, expression: &LevelExpression) {
    match expression {
        LevelExpression::DefaultLevel => {
            builder.push("resource_role.default_level");
        }
        LevelExpression::UserGrant(principal_id) => {
            push_grant_lookup(builder, "user_grants", principal_id.as_str());
        }
        LevelExpression::GroupGrant(group_id) => {
            push_grant_lookup(builder, "group_grants", group_id);
        }
        LevelExpression::Constant(level) => push_level_literal(builder, *level),
        LevelExpression::Max(operands) => match operands.as_slice() {
            [] => push_level_literal(builder, RoleLevel::NoRole),
            [single] => push_level_expression(builder, single),
            _ => {
                builder.push("GREATEST(");
                for (index, operand) in operands.iter().enumerate() {
                    if index > 0 {
                        builder.push(", ");
                    }
                    push_level_expression(builder, operand);
                }
                builder.push(")");
            }
        },
    }
}

// Absent keys read as `NoRole`.
fn push_grant_lookup(builder: &mut QueryBuilder<'static, Postgres>, column: &str, key: &str) {
    builder.push("COALESCE((resource_role.");
    builder.push(column);
    builder.push(" ->> ");
    builder.push_bind(key.to_owned());
    builder.push("::text)::integer, ");
    push_level_literal(builder, RoleLevel::NoRole);
    builder.push(")");
}

fn push_level_literal(builder: &mut QueryBuilder<'static, Postgres>, level: RoleLevel) {
    builder.push_bind(level.storage_value());
    builder.push("::integer");
}

fn push_sort(builder: &mut QueryBuilder<'static, Postgres>, sort: &ResourceSort) {
    match &sort.key {
        SortKey::CreatedAt => {
            builder.push("resource.created_at");
        }
        SortKey::UpdatedAt => {
            builder.push("resource.updated_at");
        }
        SortKey::Data(field) => {
            builder.push("(resource.data -> ");
            builder.push_bind(field.clone());
            builder.push("::text)");
        }
    }

    match sort.direction {
        SortDirection::Asc => builder.push(" ASC NULLS LAST"),
        SortDirection::Desc => builder.push(" DESC NULLS LAST"),
    };
}

#[cfg(test)]
mod tests {
    use roleguard_application::{
        QueryStage, ResourcePipeline, ResourceSort, RoleAuthority, SortDirection, SortKey,
        StageFilter,
    };
    use roleguard_core::{Principal, PrincipalId};
    use roleguard_domain::{AccessPredicate, ResourceKind, RoleLevel};
    use serde_json::json;

    use super::{PipelineOutput, build_pipeline_query};

    fn sql(pipeline: &ResourcePipeline, output: PipelineOutput) -> String {
        let Ok(builder) = build_pipeline_query(pipeline, output) else {
            panic!("pipeline should compile");
        };

        builder.sql().to_owned()
    }

    #[test]
    fn authorization_stages_compile_to_greatest_with_grant_fallback() {
        let principal = Principal::authenticated("alice").unwrap_or_else(|_| unreachable!());
        let pipeline = ResourcePipeline::for_kind(ResourceKind::Asset).with_stages(
            RoleAuthority::authorization_stages_for(
                &principal,
                &["editors".to_owned()],
                RoleLevel::Discover,
            ),
        );

        let statement = sql(&pipeline, PipelineOutput::Rows);
        assert!(statement.contains("GREATEST(resource_role.default_level, COALESCE((resource_role.user_grants ->> $2::text)::integer"));
        assert!(statement.contains("resource_role.group_grants ->> "));
        assert!(statement.ends_with("ORDER BY resource.id ASC"));
    }

    #[test]
    fn owner_filter_compiles_to_exact_grant_match() {
        let owner = PrincipalId::new("bob").unwrap_or_else(|_| unreachable!());
        let pipeline = ResourcePipeline::for_kind(ResourceKind::Space).with_stages([
            QueryStage::PopulateRole,
            QueryStage::Match(StageFilter::Access(AccessPredicate::owner(&owner))),
        ]);

        let statement = sql(&pipeline, PipelineOutput::Rows);
        assert!(statement.contains("COALESCE((resource_role.user_grants ->> $2::text)::integer = $3::integer, FALSE)"));
        assert!(!statement.contains("default_level >="));
    }

    #[test]
    fn sort_and_paging_follow_every_filter() {
        let pipeline = ResourcePipeline::for_kind(ResourceKind::Asset)
            .filter(StageFilter::ExcludeDeleted)
            .filter(StageFilter::data_equals("public_library", json!(true)))
            .sort(vec![ResourceSort::new(
                SortKey::Data("name".to_owned()),
                SortDirection::Desc,
            )])
            .page(40, 20);

        let statement = sql(&pipeline, PipelineOutput::Rows);
        let where_at = statement.find("resource.deleted_at IS NULL").unwrap_or(usize::MAX);
        let order_at = statement.find("ORDER BY").unwrap_or(0);
        assert!(where_at < order_at);
        assert!(statement.contains("DESC NULLS LAST, resource.id ASC LIMIT $"));
        assert!(statement.contains(" OFFSET $"));
    }

    #[test]
    fn counting_omits_order_and_paging() {
        let pipeline = ResourcePipeline::for_kind(ResourceKind::Asset)
            .filter(StageFilter::ExcludeDeleted)
            .page(0, 10);

        let statement = sql(&pipeline.counting(), PipelineOutput::Count);
        assert!(statement.starts_with("SELECT COUNT(*)"));
        assert!(!statement.contains("ORDER BY"));
        assert!(!statement.contains("LIMIT"));
    }

    #[test]
    fn empty_in_filter_matches_nothing() {
        let pipeline = ResourcePipeline::for_kind(ResourceKind::Asset).filter(StageFilter::DataIn {
            field: "tag".to_owned(),
            values: Vec::new(),
        });

        assert!(sql(&pipeline, PipelineOutput::Count).ends_with("AND FALSE"));
    }

    #[test]
    fn invalid_stage_order_is_rejected_before_compiling() {
        let pipeline = ResourcePipeline::for_kind(ResourceKind::Asset)
            .page(0, 10)
            .filter(StageFilter::ExcludeDeleted);

        assert!(build_pipeline_query(&pipeline, PipelineOutput::Rows).is_err());
    }
}
