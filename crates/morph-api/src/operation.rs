use serde::{Deserialize, Serialize};

use crate::CrudAction;

/// Self-describing metadata for one generated operation.
///
/// Emitted by the schema compiler into every CRUD plan so that callers (and the
/// HTTP surface) can discover what an entity type supports without
/// re-deriving it from field descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub entity_name: String,
    /// "create", "read", "update" or "delete"
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// HTTP verb of the generated surface
    pub method: String,
    /// Permission the access gate must grant before the operation runs
    pub action: CrudAction,
    pub required_params: Vec<OperationParam>,
    /// Fields this operation may write
    pub affected_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationParam {
    pub name: String,
    pub type_hint: String,
    pub description: String,
}

impl OperationParam {
    pub fn new(
        name: impl Into<String>,
        type_hint: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_hint: type_hint.into(),
            description: description.into(),
        }
    }
}
