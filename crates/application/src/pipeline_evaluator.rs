use std::cmp::Ordering;
use std::collections::HashMap;

use roleguard_core::{AppError, AppResult};
use roleguard_domain::{ProtectedResource, RoleBoundResource, RoleLevel};
use serde_json::Value;

use crate::{QueryStage, ResourcePipeline, ResourceSort, SortDirection, SortKey, StageFilter};

struct EvaluatedRow {
    resource: RoleBoundResource,
    levels: HashMap<String, RoleLevel>,
}

/// Runs a pipeline in-process over resources already joined with their roles.
///
/// Resources of other kinds are ignored. Without a `Sort` stage resources are
/// returned in resource id order, which is also the tie-breaker for every sort.
pub fn evaluate_pipeline(
    pipeline: &ResourcePipeline,
    resources: Vec<RoleBoundResource>,
) -> AppResult<Vec<RoleBoundResource>> {
    pipeline.validate()?;

    let mut rows: Vec<EvaluatedRow> = resources
        .into_iter()
        .filter(|resource| resource.document().kind() == pipeline.kind())
        .map(|resource| EvaluatedRow {
            resource,
            levels: HashMap::new(),
        })
        .collect();
    rows.sort_by_key(|row| row.resource.resource_id());

    for stage in pipeline.stages() {
        match stage {
            // Candidates arrive joined with their roles.
            QueryStage::PopulateRole => {}
            QueryStage::ComputeLevel { alias, expression } => {
                for row in &mut rows {
                    let level = expression.evaluate(row.resource.role());
                    row.levels.insert(alias.clone(), level);
                }
            }
            QueryStage::Match(filter) => {
                let mut kept = Vec::with_capacity(rows.len());
                for row in rows {
                    if row_matches(&row, filter)? {
                        kept.push(row);
                    }
                }
                rows = kept;
            }
            QueryStage::Sort(sorts) => {
                rows.sort_by(|left, right| compare_rows(left, right, sorts));
            }
            QueryStage::Skip(count) => {
                rows = rows.into_iter().skip(*count).collect();
            }
            QueryStage::Limit(count) => rows.truncate(*count),
        }
    }

    Ok(rows.into_iter().map(|row| row.resource).collect())
}

fn row_matches(row: &EvaluatedRow, filter: &StageFilter) -> AppResult<bool> {
    let document = row.resource.document();

    match filter {
        StageFilter::LevelAtLeast { alias, threshold } => row
            .levels
            .get(alias)
            .map(|level| level >= threshold)
            .ok_or_else(|| {
                AppError::InvariantViolation(format!(
                    "level alias '{alias}' was not computed for resource '{}'",
                    document.id()
                ))
            }),
        StageFilter::Access(predicate) => Ok(predicate.evaluate(row.resource.role())),
        StageFilter::DataEquals { field, value } => Ok(document
            .field(field)
            .is_some_and(|stored| json_values_equal(stored, value))),
        StageFilter::DataIn { field, values } => Ok(document.field(field).is_some_and(|stored| {
            values.iter().any(|value| json_values_equal(stored, value))
        })),
        StageFilter::ExcludeDeleted => Ok(!document.is_deleted()),
        StageFilter::All(filters) => {
            for nested in filters {
                if !row_matches(row, nested)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        StageFilter::Any(filters) => {
            for nested in filters {
                if row_matches(row, nested)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn compare_rows(left: &EvaluatedRow, right: &EvaluatedRow, sorts: &[ResourceSort]) -> Ordering {
    let left_document = left.resource.document();
    let right_document = right.resource.document();

    for sort in sorts {
        let ordering = match &sort.key {
            SortKey::CreatedAt => apply_direction(
                left_document.created_at().cmp(&right_document.created_at()),
                sort.direction,
            ),
            SortKey::UpdatedAt => apply_direction(
                left_document.updated_at().cmp(&right_document.updated_at()),
                sort.direction,
            ),
            SortKey::Data(field) => compare_optional_values(
                left_document.field(field),
                right_document.field(field),
                sort.direction,
            ),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    left_document.id().cmp(&right_document.id())
}

fn apply_direction(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

// Missing fields sort last in both directions.
fn compare_optional_values(
    left: Option<&Value>,
    right: Option<&Value>,
    direction: SortDirection,
) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => apply_direction(compare_json_values(left, right), direction),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// jsonb equality: `1` and `1.0` are the same number.
fn json_values_equal(left: &Value, right: &Value) -> bool {
    compare_json_values(left, right) == Ordering::Equal
}

// Mirrors jsonb ordering: null < string < number < boolean < array < object.
// Arrays compare by length, then element-wise. Objects compare by pair count,
// then pairwise in jsonb key order (shorter keys first).
fn compare_json_values(left: &Value, right: &Value) -> Ordering {
    let rank = |value: &Value| match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    };

    match (left, right) {
        (Value::String(left), Value::String(right)) => left.cmp(right),
        (Value::Number(left), Value::Number(right)) => left
            .as_f64()
            .zip(right.as_f64())
            .and_then(|(left, right)| left.partial_cmp(&right))
            .unwrap_or(Ordering::Equal),
        (Value::Bool(left), Value::Bool(right)) => left.cmp(right),
        (Value::Array(left), Value::Array(right)) => left.len().cmp(&right.len()).then_with(|| {
            left.iter()
                .zip(right)
                .map(|(left, right)| compare_json_values(left, right))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        }),
        (Value::Object(left), Value::Object(right)) => {
            left.len().cmp(&right.len()).then_with(|| {
                let left_pairs = jsonb_key_order(left);
                let right_pairs = jsonb_key_order(right);
                left_pairs
                    .iter()
                    .zip(&right_pairs)
                    .map(|((left_key, left_value), (right_key, right_value))| {
                        compare_jsonb_keys(left_key, right_key)
                            .then_with(|| compare_json_values(left_value, right_value))
                    })
                    .find(|ordering| *ordering != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            })
        }
        _ => rank(left).cmp(&rank(right)),
    }
}

fn jsonb_key_order(object: &serde_json::Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut pairs: Vec<_> = object.iter().collect();
    pairs.sort_by(|(left, _), (right, _)| compare_jsonb_keys(left, right));
    pairs
}

fn compare_jsonb_keys(left: &str, right: &str) -> Ordering {
    left.len().cmp(&right.len()).then_with(|| left.as_bytes().cmp(right.as_bytes()))
}
