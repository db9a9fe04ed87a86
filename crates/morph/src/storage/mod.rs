//! Entity store implementations and the document-level query engine they share.

mod memory;

use std::cmp::Ordering;

use morph_api::Document;
use morph_core::{Filter, SortKey, Update};
use serde_json::Value;

pub use memory::MemoryEntityStore;

/// Whether `doc` satisfies `filter`.
pub fn matches(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(field, expected) => field_eq(doc.get(field), expected),
        Filter::In(field, values) => values.iter().any(|v| field_eq(doc.get(field), v)),
        Filter::Contains(field, term) => {
            let term = term.to_lowercase();
            match doc.get(field) {
                Some(Value::Array(items)) => items.iter().any(|item| contains(item, &term)),
                Some(value) => contains(value, &term),
                None => false,
            }
        }
        Filter::Range {
            field,
            gt,
            gte,
            lt,
            lte,
        } => {
            let Some(actual) = doc.get(field).filter(|v| !v.is_null()) else {
                return false;
            };
            let check = |bound: &Option<Value>, accept: fn(Ordering) -> bool| match bound {
                None => true,
                Some(bound) => comparable(actual, bound)
                    .then(|| compare_values(actual, bound))
                    .is_some_and(accept),
            };
            check(gt, Ordering::is_gt)
                && check(gte, Ordering::is_ge)
                && check(lt, Ordering::is_lt)
                && check(lte, Ordering::is_le)
        }
        Filter::And(filters) => filters.iter().all(|f| matches(doc, f)),
        Filter::Or(filters) => filters.iter().any(|f| matches(doc, f)),
        Filter::IsNull(field) => doc.get(field).is_none_or(Value::is_null),
        Filter::IsNotNull(field) => doc.get(field).is_some_and(|v| !v.is_null()),
    }
}

fn field_eq(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| value_eq(item, expected))
        }
        Some(actual) => value_eq(actual, expected),
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn contains(value: &Value, term: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(term),
        Value::Number(n) => n.to_string().contains(term),
        _ => false,
    }
}

fn comparable(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b)
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(a, b)| compare_values(a, b))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

pub fn compare_docs(a: &Document, b: &Document, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let left = a.get(&key.field).unwrap_or(&Value::Null);
        let right = b.get(&key.field).unwrap_or(&Value::Null);
        let ordering = compare_values(left, right);
        let ordering = if key.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering.is_ne() {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Apply `update` in place: set, unset, add-to-set, pull.
pub fn apply_update(doc: &mut Document, update: &Update) {
    for (field, value) in &update.set {
        doc.insert(field.clone(), value.clone());
    }
    for field in &update.unset {
        doc.remove(field);
    }
    for (field, value) in &update.add_to_set {
        let slot = doc.entry(field.clone()).or_insert(Value::Null);
        let mut items = match slot.take() {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            scalar => vec![scalar],
        };
        if !items.iter().any(|item| value_eq(item, value)) {
            items.push(value.clone());
        }
        *slot = Value::Array(items);
    }
    for (field, value) in &update.pull {
        if let Some(Value::Array(items)) = doc.get_mut(field) {
            items.retain(|item| !value_eq(item, value));
        }
    }
}
