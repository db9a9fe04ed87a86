//! Per-field classification: field descriptor in, tagged storage kind out.

use morph_api::{ApiError, FieldDescriptor, PrimitiveType, Result, SYSTEM_FIELDS};
use serde::{Deserialize, Serialize};

const SELECT_HINTS: [&str; 4] = ["select", "multiselect", "radio", "checkboxes"];
const MULTI_SELECT_HINTS: [&str; 2] = ["multiselect", "checkboxes"];
const MEDIA_HINTS: [&str; 6] = ["file", "files", "image", "images", "media", "gallery"];
const MULTI_MEDIA_HINTS: [&str; 3] = ["files", "images", "gallery"];
const BOOLEAN_HINTS: [&str; 3] = ["toggle", "switch", "checkbox"];
const SECRET_HINTS: [&str; 1] = ["password"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Text,
    Number,
    Boolean,
    Date,
    Object,
}

/// Storage kind of a compiled field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldKind {
    Scalar { scalar: ScalarType },
    Enum { values: Vec<String>, multiple: bool },
    /// Collection of foreign ids referencing `target`
    Relation { target: String },
    /// Opaque path string(s) handled by the media collaborator
    Media { multiple: bool },
    /// Stored as a one-way digest, never returned
    Secret,
}

impl FieldKind {
    pub fn is_relation(&self) -> bool {
        matches!(self, FieldKind::Relation { .. })
    }

    pub fn relation_target(&self) -> Option<&str> {
        match self {
            FieldKind::Relation { target } => Some(target),
            _ => None,
        }
    }

    pub fn is_searchable(&self) -> bool {
        match self {
            FieldKind::Scalar { scalar } => *scalar != ScalarType::Boolean,
            FieldKind::Enum { .. } => true,
            FieldKind::Relation { .. } | FieldKind::Media { .. } | FieldKind::Secret => false,
        }
    }

    pub fn is_filterable(&self) -> bool {
        !matches!(self, FieldKind::Media { .. } | FieldKind::Secret)
    }

    pub fn is_sortable(&self) -> bool {
        matches!(self, FieldKind::Scalar { .. } | FieldKind::Enum { multiple: false, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageField {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub ui_hint: String,
    /// One of the reserved SEO fields
    pub seo: bool,
}

impl StorageField {
    /// Rebuild the descriptor this field compiles from.
    pub fn describe(&self) -> FieldDescriptor {
        let mut descriptor = FieldDescriptor::new(self.name.clone(), primitive_of(&self.kind))
            .with_hint(self.ui_hint.clone());
        descriptor.required = self.required;
        match &self.kind {
            FieldKind::Enum { values, .. } => descriptor.enum_values = values.clone(),
            FieldKind::Relation { target } => descriptor.relation_target = Some(target.clone()),
            _ => {}
        }
        descriptor
    }
}

fn primitive_of(kind: &FieldKind) -> PrimitiveType {
    match kind {
        FieldKind::Scalar { scalar } => match scalar {
            ScalarType::Text => PrimitiveType::String,
            ScalarType::Number => PrimitiveType::Number,
            ScalarType::Boolean => PrimitiveType::Boolean,
            ScalarType::Date => PrimitiveType::Date,
            ScalarType::Object => PrimitiveType::Object,
        },
        FieldKind::Enum { multiple: true, .. }
        | FieldKind::Media { multiple: true }
        | FieldKind::Relation { .. } => PrimitiveType::Array,
        FieldKind::Enum { multiple: false, .. }
        | FieldKind::Media { multiple: false }
        | FieldKind::Secret => PrimitiveType::String,
    }
}

/// Letters, digits and underscores, not starting with a digit.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn hint_in(hint: &str, set: &[&str]) -> bool {
    set.iter().any(|h| h.eq_ignore_ascii_case(hint))
}

pub fn is_media_hint(hint: &str) -> bool {
    hint_in(hint.trim(), &MEDIA_HINTS)
}

pub fn classify(descriptor: &FieldDescriptor) -> Result<StorageField> {
    let name = descriptor.name.as_str();
    if !is_identifier(name) {
        return Err(ApiError::invalid_descriptor(format!(
            "field name '{}' is not an identifier",
            name
        )));
    }
    if SYSTEM_FIELDS.contains(&name) {
        return Err(ApiError::invalid_descriptor(format!(
            "field name '{}' is reserved for the platform",
            name
        )));
    }

    let hint = descriptor.ui_hint.trim();
    let kind = kind_of(descriptor, hint)?;

    Ok(StorageField {
        name: name.to_string(),
        kind,
        required: descriptor.required,
        ui_hint: descriptor.ui_hint.clone(),
        seo: false,
    })
}

fn kind_of(descriptor: &FieldDescriptor, hint: &str) -> Result<FieldKind> {
    let name = &descriptor.name;

    if let Some(target) = &descriptor.relation_target {
        let target = target.trim();
        if target.is_empty() {
            return Err(ApiError::invalid_descriptor(format!(
                "relation field '{}' has an empty target",
                name
            )));
        }
        return Ok(FieldKind::Relation {
            target: target.to_lowercase(),
        });
    }

    if hint_in(hint, &SECRET_HINTS) {
        return Ok(FieldKind::Secret);
    }

    if hint_in(hint, &MEDIA_HINTS) {
        let multiple =
            descriptor.primitive_type == PrimitiveType::Array || hint_in(hint, &MULTI_MEDIA_HINTS);
        return Ok(FieldKind::Media { multiple });
    }

    let select_hint = hint_in(hint, &SELECT_HINTS);
    if select_hint || !descriptor.enum_values.is_empty() {
        if descriptor.enum_values.is_empty() {
            return Err(ApiError::invalid_descriptor(format!(
                "field '{}' uses hint '{}' but declares no enum values",
                name, hint
            )));
        }
        if !matches!(
            descriptor.primitive_type,
            PrimitiveType::String | PrimitiveType::Array
        ) {
            return Err(ApiError::invalid_descriptor(format!(
                "enum values on field '{}' require a string or array type, got {}",
                name, descriptor.primitive_type
            )));
        }
        let multiple =
            descriptor.primitive_type == PrimitiveType::Array || hint_in(hint, &MULTI_SELECT_HINTS);
        return Ok(FieldKind::Enum {
            values: descriptor.enum_values.clone(),
            multiple,
        });
    }

    if hint_in(hint, &BOOLEAN_HINTS) {
        return Ok(FieldKind::Scalar {
            scalar: ScalarType::Boolean,
        });
    }

    let scalar = match descriptor.primitive_type {
        PrimitiveType::String => ScalarType::Text,
        PrimitiveType::Number => ScalarType::Number,
        PrimitiveType::Boolean => ScalarType::Boolean,
        PrimitiveType::Date => ScalarType::Date,
        PrimitiveType::Object => ScalarType::Object,
        PrimitiveType::Array => {
            return Err(ApiError::invalid_descriptor(format!(
                "array field '{}' needs a relation target or enum values",
                name
            )));
        }
    };
    Ok(FieldKind::Scalar { scalar })
}
