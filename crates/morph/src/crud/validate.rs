//! Payload validation and coercion against a compiled storage schema.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use morph_api::{ApiError, Document, Result, SYSTEM_FIELDS};
use morph_core::Update;
use serde_json::{Number, Value};
use sha2::{Digest, Sha256};

use crate::compiler::{FieldKind, ScalarType, StorageField, StorageSchema};

pub fn hash_secret(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn invalid(field: &StorageField, message: impl Into<String>) -> ApiError {
    ApiError::validation(field.name.clone(), message)
}

fn parse_number(text: &str) -> Option<Number> {
    let text = text.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Some(n.into());
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}

fn parse_date(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(format_timestamp),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(at) = DateTime::parse_from_rfc3339(s) {
                return Some(format_timestamp(at.with_timezone(&Utc)));
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| format_timestamp(naive.and_utc()))
        }
        _ => None,
    }
}

fn string_items(field: &StorageField, value: Value) -> Result<Vec<String>> {
    match value {
        Value::String(s) => Ok(vec![s]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(invalid(field, format!("expected string items, got {}", other))),
            })
            .collect(),
        other => Err(invalid(field, format!("expected string or array, got {}", other))),
    }
}

/// Coerce a non-null client value to the field's storage kind.
pub fn coerce(field: &StorageField, value: Value) -> Result<Value> {
    match &field.kind {
        FieldKind::Scalar { scalar } => coerce_scalar(field, *scalar, value),
        FieldKind::Enum { values, multiple } => {
            let items = if *multiple {
                string_items(field, value)?
            } else {
                match value {
                    Value::String(s) => vec![s],
                    other => return Err(invalid(field, format!("expected string, got {}", other))),
                }
            };
            if let Some(bad) = items.iter().find(|item| !values.contains(item)) {
                return Err(invalid(
                    field,
                    format!("'{}' is not one of [{}]", bad, values.join(", ")),
                ));
            }
            Ok(if *multiple {
                Value::from(items)
            } else {
                Value::from(items.into_iter().next().unwrap_or_default())
            })
        }
        FieldKind::Relation { .. } => {
            let mut ids: Vec<String> = Vec::new();
            for id in string_items(field, value)? {
                let id = id.trim().to_string();
                if !id.is_empty() && !ids.contains(&id) {
                    ids.push(id);
                }
            }
            Ok(Value::from(ids))
        }
        FieldKind::Media { multiple: true } => Ok(Value::from(string_items(field, value)?)),
        FieldKind::Media { multiple: false } | FieldKind::Secret => match value {
            Value::String(s) if matches!(field.kind, FieldKind::Secret) => {
                Ok(Value::String(hash_secret(&s)))
            }
            Value::String(s) => Ok(Value::String(s)),
            other => Err(invalid(field, format!("expected string, got {}", other))),
        },
    }
}

fn coerce_scalar(field: &StorageField, scalar: ScalarType, value: Value) -> Result<Value> {
    match (scalar, value) {
        (ScalarType::Text, Value::String(s)) => Ok(Value::String(s)),
        (ScalarType::Text, Value::Number(n)) => Ok(Value::String(n.to_string())),
        (ScalarType::Text, Value::Bool(b)) => Ok(Value::String(b.to_string())),
        (ScalarType::Number, Value::Number(n)) => Ok(Value::Number(n)),
        (ScalarType::Number, Value::String(s)) => parse_number(&s)
            .map(Value::Number)
            .ok_or_else(|| invalid(field, format!("'{}' is not a number", s))),
        (ScalarType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
        (ScalarType::Boolean, Value::String(s)) => match s.trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(invalid(field, format!("'{}' is not a boolean", other))),
        },
        (ScalarType::Date, value) => parse_date(&value)
            .map(Value::String)
            .ok_or_else(|| invalid(field, format!("{} is not a date", value))),
        (ScalarType::Object, Value::Object(map)) => Ok(Value::Object(map)),
        (scalar, other) => Err(invalid(
            field,
            format!("expected {}, got {}", scalar_name(scalar), other),
        )),
    }
}

fn scalar_name(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::Text => "string",
        ScalarType::Number => "number",
        ScalarType::Boolean => "boolean",
        ScalarType::Date => "date",
        ScalarType::Object => "object",
    }
}

/// Lenient coercion for filter values: falls back to the raw value.
pub fn coerce_filter_value(field: &StorageField, value: Value) -> Value {
    match (&field.kind, &value) {
        (_, Value::String(s)) if s == "true" || s == "false" => Value::Bool(s == "true"),
        (
            FieldKind::Scalar {
                scalar: ScalarType::Number | ScalarType::Date,
            },
            _,
        ) => coerce(field, value.clone()).unwrap_or(value),
        _ => value,
    }
}

fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Build the document to insert: declared fields only, coerced, required
/// fields present, relation fields defaulted to `[]`.
pub fn prepare_create(schema: &StorageSchema, mut payload: Document) -> Result<Document> {
    let mut doc = Document::new();
    for field in &schema.fields {
        let value = payload.remove(&field.name).unwrap_or(Value::Null);
        let value = if value.is_null() {
            Value::Null
        } else {
            coerce(field, value)?
        };

        if field.required && is_missing(&value) {
            return Err(invalid(field, "is required"));
        }
        match value {
            Value::Null if field.kind.is_relation() => {
                doc.insert(field.name.clone(), Value::Array(Vec::new()));
            }
            Value::Null => {}
            value => {
                doc.insert(field.name.clone(), value);
            }
        }
    }
    Ok(doc)
}

/// Build a `$set`/`$unset` update from a partial payload. Only fields present
/// in the payload change.
pub fn prepare_update(schema: &StorageSchema, payload: Document) -> Result<Update> {
    let mut update = Update::new();
    for (name, value) in payload {
        if SYSTEM_FIELDS.contains(&name.as_str()) {
            continue;
        }
        let Some(field) = schema.field(&name) else {
            continue;
        };
        if value.is_null() {
            if field.required {
                return Err(invalid(field, "is required"));
            }
            update = if field.kind.is_relation() {
                update.set(name, Value::Array(Vec::new()))
            } else {
                update.unset(name)
            };
            continue;
        }
        let value = coerce(field, value)?;
        if field.required && is_missing(&value) {
            return Err(invalid(field, "is required"));
        }
        update = update.set(name, value);
    }
    Ok(update)
}
