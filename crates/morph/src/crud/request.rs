//! Interpretation of read query parameters against a compiled handle.

use morph_api::{ApiError, ID_FIELD, ReadQuery, Result};
use morph_core::{Filter, FindOptions, SortKey};
use serde_json::{Map, Value};

use crate::catalog::IncomingRelation;
use crate::compiler::{CompiledArtifacts, FieldKind, Pagination};

use super::validate::coerce_filter_value;

/// A relation to expand in read results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateTarget {
    pub field: String,
    pub target_entity: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadPlan {
    pub filter: Filter,
    pub options: FindOptions,
    pub page: usize,
    pub limit: usize,
    /// `None` returns every field
    pub projection: Option<Vec<String>>,
    pub populate: Vec<PopulateTarget>,
}

fn split_list(raw: Option<&str>) -> Vec<&str> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn is_known_field(artifacts: &CompiledArtifacts, incoming: &[IncomingRelation], name: &str) -> bool {
    artifacts.storage_schema.field(name).is_some()
        || artifacts.crud_plan.is_sortable(name)
        || incoming.iter().any(|i| i.reverse_field == name)
}

/// Free-text search across the searchable fields. An empty searchable set
/// matches nothing.
pub fn search_filter(artifacts: &CompiledArtifacts, term: &str) -> Filter {
    Filter::Or(
        artifacts
            .crud_plan
            .searchable_fields
            .iter()
            .map(|field| Filter::Contains(field.clone(), term.to_string()))
            .collect(),
    )
}

pub fn parse_sort(artifacts: &CompiledArtifacts, raw: Option<&str>) -> Result<Vec<SortKey>> {
    split_list(raw)
        .into_iter()
        .map(|token| {
            let (field, descending) = match token.strip_prefix('-') {
                Some(field) => (field.trim(), true),
                None => (token.strip_prefix('+').unwrap_or(token), false),
            };
            if !artifacts.crud_plan.is_sortable(field) {
                return Err(ApiError::validation(field, "cannot sort by this field"));
            }
            Ok(SortKey {
                field: field.to_string(),
                descending,
            })
        })
        .collect()
}

pub fn parse_filter(
    artifacts: &CompiledArtifacts,
    incoming: &[IncomingRelation],
    raw: Option<&str>,
) -> Result<Filter> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(Filter::all());
    };
    let parsed: Value = serde_json::from_str(raw)
        .map_err(|e| ApiError::validation("filter", format!("invalid JSON: {}", e)))?;
    let Value::Object(entries) = parsed else {
        return Err(ApiError::validation("filter", "must be a JSON object"));
    };

    let mut clauses = Vec::with_capacity(entries.len());
    for (name, value) in entries {
        let field = artifacts.storage_schema.field(&name);
        match field.map(|f| &f.kind) {
            Some(FieldKind::Media { .. }) => {
                return Err(ApiError::validation(name, "media fields cannot be filtered"));
            }
            Some(FieldKind::Secret) => {
                return Err(ApiError::validation(name, "secret fields cannot be filtered"));
            }
            Some(_) => {}
            None if is_known_field(artifacts, incoming, &name) => {}
            None => return Err(ApiError::validation(name, "unknown field")),
        }

        let coerce = |v: Value| match field {
            Some(field) => coerce_filter_value(field, v),
            None => v,
        };
        clauses.push(field_clause(name, value, coerce)?);
    }
    Ok(Filter::And(clauses))
}

fn field_clause(name: String, value: Value, coerce: impl Fn(Value) -> Value) -> Result<Filter> {
    match value {
        Value::Null => Ok(Filter::IsNull(name)),
        Value::Array(items) => Ok(Filter::In(name, items.into_iter().map(coerce).collect())),
        Value::Object(ops) if ops.keys().all(|k| k.starts_with('$')) => operator_clause(name, ops, coerce),
        other => Ok(Filter::Eq(name, coerce(other))),
    }
}

fn operator_clause(
    name: String,
    ops: Map<String, Value>,
    coerce: impl Fn(Value) -> Value,
) -> Result<Filter> {
    let (mut gt, mut gte, mut lt, mut lte) = (None, None, None, None);
    let mut extra = Vec::new();
    for (op, value) in ops {
        match op.as_str() {
            "$gt" => gt = Some(coerce(value)),
            "$gte" => gte = Some(coerce(value)),
            "$lt" => lt = Some(coerce(value)),
            "$lte" => lte = Some(coerce(value)),
            "$eq" => extra.push(Filter::Eq(name.clone(), coerce(value))),
            "$in" => match value {
                Value::Array(items) => {
                    extra.push(Filter::In(name.clone(), items.into_iter().map(&coerce).collect()))
                }
                _ => return Err(ApiError::validation(name, "$in expects an array")),
            },
            other => {
                return Err(ApiError::validation(
                    name,
                    format!("unsupported operator {}", other),
                ));
            }
        }
    }
    if gt.is_some() || gte.is_some() || lt.is_some() || lte.is_some() {
        extra.push(Filter::Range {
            field: name,
            gt,
            gte,
            lt,
            lte,
        });
    }
    Ok(Filter::And(extra))
}

fn parse_projection(
    artifacts: &CompiledArtifacts,
    incoming: &[IncomingRelation],
    raw: Option<&str>,
) -> Result<Option<Vec<String>>> {
    let names = split_list(raw);
    if names.is_empty() {
        return Ok(None);
    }
    let mut projection = vec![ID_FIELD.to_string()];
    for name in names {
        if !is_known_field(artifacts, incoming, name) {
            return Err(ApiError::validation(name, "unknown field"));
        }
        if !projection.iter().any(|p| p == name) {
            projection.push(name.to_string());
        }
    }
    Ok(Some(projection))
}

fn parse_populate(
    artifacts: &CompiledArtifacts,
    incoming: &[IncomingRelation],
    raw: Option<&str>,
) -> Result<Vec<PopulateTarget>> {
    split_list(raw)
        .into_iter()
        .map(|name| {
            if let Some(target) = artifacts
                .storage_schema
                .field(name)
                .and_then(|f| f.kind.relation_target())
            {
                return Ok(PopulateTarget {
                    field: name.to_string(),
                    target_entity: target.to_string(),
                });
            }
            incoming
                .iter()
                .find(|i| i.reverse_field == name)
                .map(|i| PopulateTarget {
                    field: name.to_string(),
                    target_entity: i.source_entity.clone(),
                })
                .ok_or_else(|| ApiError::validation(name, "is not a relation field"))
        })
        .collect()
}

/// Plan a paged read. `pagination` overrides the plan's own contract when set.
pub fn plan_read(
    artifacts: &CompiledArtifacts,
    incoming: &[IncomingRelation],
    query: &ReadQuery,
    pagination: Option<Pagination>,
) -> Result<ReadPlan> {
    let pagination = pagination.unwrap_or(artifacts.crud_plan.pagination);
    let page = usize::try_from(query.page.unwrap_or(1).max(1)).unwrap_or(usize::MAX);
    let limit = pagination.clamp(query.limit);

    let mut filter = parse_filter(artifacts, incoming, query.filter.as_deref())?;
    if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        filter = filter.and(search_filter(artifacts, term));
    }

    Ok(ReadPlan {
        filter,
        options: FindOptions {
            sort: parse_sort(artifacts, query.sort.as_deref())?,
            skip: (page - 1).saturating_mul(limit),
            limit: Some(limit),
        },
        page,
        limit,
        projection: parse_projection(artifacts, incoming, query.fields.as_deref())?,
        populate: parse_populate(artifacts, incoming, query.populate.as_deref())?,
    })
}

/// Projection and populate for a single-instance read.
pub fn plan_read_one(
    artifacts: &CompiledArtifacts,
    incoming: &[IncomingRelation],
    query: &ReadQuery,
) -> Result<(Option<Vec<String>>, Vec<PopulateTarget>)> {
    Ok((
        parse_projection(artifacts, incoming, query.fields.as_deref())?,
        parse_populate(artifacts, incoming, query.populate.as_deref())?,
    ))
}
