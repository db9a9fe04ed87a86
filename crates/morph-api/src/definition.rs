use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::FieldDescriptor;

/// Persisted definition of an entity type; the source of truth the registry
/// compiles from.
///
/// `revision` is the modification marker. It is stamped by the catalog on every
/// successful define/redefine and only ever grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeDefinition {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revision: u64,
}

impl EntityTypeDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Relation fields pointing at `target`.
    pub fn relations_to<'a>(
        &'a self,
        target: &'a str,
    ) -> impl Iterator<Item = &'a FieldDescriptor> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.relation_target.as_deref() == Some(target))
    }
}
