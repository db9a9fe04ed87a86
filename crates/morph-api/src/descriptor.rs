//! Field descriptors: the declarative unit operators submit for an entity type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Nominal primitive type of a field as declared by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
}

impl PrimitiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Number => "number",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Date => "date",
            PrimitiveType::Object => "object",
            PrimitiveType::Array => "array",
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative metadata for one field of an entity type.
///
/// Pure data. The schema compiler turns it into a tagged storage kind
/// (scalar, enum, relation, media or secret).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    pub primitive_type: PrimitiveType,
    /// Opaque presentation hint ("text", "select", "password", "image", ...)
    #[serde(default)]
    pub ui_hint: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    /// Name of another entity type; presence makes this a relation field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_target: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, primitive_type: PrimitiveType) -> Self {
        Self {
            name: name.into(),
            primitive_type,
            ui_hint: String::new(),
            required: false,
            enum_values: Vec::new(),
            relation_target: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, PrimitiveType::String)
    }

    /// Relation field targeting `target`, declared as an array of references.
    pub fn relation(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, PrimitiveType::Array)
            .with_hint("relation")
            .with_relation_target(target)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_hint(mut self, ui_hint: impl Into<String>) -> Self {
        self.ui_hint = ui_hint.into();
        self
    }

    pub fn with_enum_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_relation_target(mut self, target: impl Into<String>) -> Self {
        self.relation_target = Some(target.into());
        self
    }

    pub fn is_relation(&self) -> bool {
        self.relation_target.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_with_defaults() {
        let field: FieldDescriptor = serde_json::from_str(
            r#"{"name":"authors","primitiveType":"array","relationTarget":"author"}"#,
        )
        .unwrap();

        assert_eq!(field.name, "authors");
        assert_eq!(field.primitive_type, PrimitiveType::Array);
        assert_eq!(field.relation_target.as_deref(), Some("author"));
        assert!(!field.required);
        assert!(field.enum_values.is_empty());
        assert_eq!(field.ui_hint, "");
    }

    #[test]
    fn serialization_skips_empty_optionals() {
        let json = serde_json::to_value(FieldDescriptor::string("title").required()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "title",
                "primitiveType": "string",
                "uiHint": "",
                "required": true
            })
        );
    }
}
