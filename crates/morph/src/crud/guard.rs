use morph_api::Document;
use morph_core::Filter;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compiler::StorageSchema;

/// Refuses to delete the last instance holding the administrator role.
///
/// Applies to every entity type whose schema declares `role_field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminGuard {
    pub role_field: String,
    pub admin_value: String,
}

impl Default for AdminGuard {
    fn default() -> Self {
        Self {
            role_field: "role".to_string(),
            admin_value: "admin".to_string(),
        }
    }
}

impl AdminGuard {
    pub fn applies_to(&self, schema: &StorageSchema) -> bool {
        schema.field(&self.role_field).is_some()
    }

    pub fn is_admin(&self, doc: &Document) -> bool {
        match doc.get(&self.role_field) {
            Some(Value::String(role)) => *role == self.admin_value,
            Some(Value::Array(roles)) => roles.iter().any(|r| r.as_str() == Some(&self.admin_value)),
            _ => false,
        }
    }

    pub fn admin_filter(&self) -> Filter {
        Filter::eq(self.role_field.clone(), self.admin_value.clone())
    }
}
