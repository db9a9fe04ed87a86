//! Compiled artifacts: storage schema, CRUD plan and reverse-relation plan.

use morph_api::{
    CREATED_AT_FIELD, CrudAction, FieldDescriptor, ID_FIELD, OperationDescriptor, OperationParam,
    UPDATED_AT_FIELD,
};
use serde::{Deserialize, Serialize};

use super::field::{FieldKind, StorageField};

pub const DEFAULT_PAGE_LIMIT: usize = 10;
pub const MAX_PAGE_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSchema {
    pub fields: Vec<StorageField>,
}

impl StorageSchema {
    pub fn field(&self, name: &str) -> Option<&StorageField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Decompile back into descriptors (SEO fields included).
    pub fn describe(&self) -> Vec<FieldDescriptor> {
        self.fields.iter().map(StorageField::describe).collect()
    }

    pub fn relation_fields(&self) -> impl Iterator<Item = (&StorageField, &str)> {
        self.fields
            .iter()
            .filter_map(|f| f.kind.relation_target().map(|target| (f, target)))
    }

    pub fn secret_fields(&self) -> impl Iterator<Item = &StorageField> {
        self.fields
            .iter()
            .filter(|f| matches!(f.kind, FieldKind::Secret))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: MAX_PAGE_LIMIT,
        }
    }
}

impl Pagination {
    /// Requested limit with the default applied and the maximum enforced.
    /// Never below 1, even for a zeroed contract.
    pub fn clamp(&self, requested: Option<u64>) -> usize {
        let max = self.max_limit.max(1);
        match requested {
            None | Some(0) => self.default_limit.clamp(1, max),
            Some(n) => usize::try_from(n).unwrap_or(usize::MAX).min(max),
        }
    }

    /// Zero limits raised to 1 and the default capped at the maximum.
    pub fn normalized(self) -> Self {
        let max_limit = self.max_limit.max(1);
        Self {
            default_limit: self.default_limit.clamp(1, max_limit),
            max_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrudPlan {
    pub entity_name: String,
    pub operations: Vec<OperationDescriptor>,
    /// Fields matched by free-text search, in declaration order
    pub searchable_fields: Vec<String>,
    pub required_fields: Vec<String>,
    pub relation_fields: Vec<String>,
    pub sortable_fields: Vec<String>,
    pub filterable_fields: Vec<String>,
    pub pagination: Pagination,
}

impl CrudPlan {
    pub fn operation(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.iter().find(|op| op.name == name)
    }

    pub fn action_for(&self, name: &str) -> Option<CrudAction> {
        self.operation(name).map(|op| op.action)
    }

    pub fn is_sortable(&self, field: &str) -> bool {
        self.sortable_fields.iter().any(|f| f == field)
    }

    pub fn is_filterable(&self, field: &str) -> bool {
        self.filterable_fields.iter().any(|f| f == field)
    }

    pub(super) fn build(entity_name: &str, schema: &StorageSchema) -> Self {
        let searchable_fields = field_names(schema, |f| f.kind.is_searchable());
        let required_fields = field_names(schema, |f| f.required);
        let relation_fields = field_names(schema, |f| f.kind.is_relation());
        let writable_fields = field_names(schema, |_| true);

        let system = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD].map(String::from);
        let mut sortable_fields = field_names(schema, |f| f.kind.is_sortable());
        sortable_fields.extend(system.iter().cloned());
        let mut filterable_fields = field_names(schema, |f| f.kind.is_filterable());
        filterable_fields.extend(system.iter().cloned());

        let operations = vec![
            OperationDescriptor {
                entity_name: entity_name.to_string(),
                name: "create".to_string(),
                display_name: format!("Create {}", entity_name),
                description: format!("Create a new {} instance", entity_name),
                method: "POST".to_string(),
                action: CrudAction::Create,
                required_params: required_fields
                    .iter()
                    .map(|f| {
                        OperationParam::new(f.clone(), field_type_hint(schema, f), "required field")
                    })
                    .collect(),
                affected_fields: writable_fields.clone(),
            },
            OperationDescriptor {
                entity_name: entity_name.to_string(),
                name: "read".to_string(),
                display_name: format!("List {}", entity_name),
                description: format!(
                    "Read one {} by id or a page of them with search, sort, filter and populate",
                    entity_name
                ),
                method: "GET".to_string(),
                action: CrudAction::Read,
                required_params: Vec::new(),
                affected_fields: Vec::new(),
            },
            OperationDescriptor {
                entity_name: entity_name.to_string(),
                name: "update".to_string(),
                display_name: format!("Update {}", entity_name),
                description: format!("Update fields of an existing {} instance", entity_name),
                method: "PUT".to_string(),
                action: CrudAction::Update,
                required_params: vec![OperationParam::new(ID_FIELD, "string", "instance id")],
                affected_fields: writable_fields,
            },
            OperationDescriptor {
                entity_name: entity_name.to_string(),
                name: "delete".to_string(),
                display_name: format!("Delete {}", entity_name),
                description: format!("Delete a {} instance", entity_name),
                method: "DELETE".to_string(),
                action: CrudAction::Delete,
                required_params: vec![OperationParam::new("id", "string", "instance id")],
                affected_fields: Vec::new(),
            },
        ];

        Self {
            entity_name: entity_name.to_string(),
            operations,
            searchable_fields,
            required_fields,
            relation_fields,
            sortable_fields,
            filterable_fields,
            pagination: Pagination::default(),
        }
    }
}

fn field_names(schema: &StorageSchema, pred: impl Fn(&StorageField) -> bool) -> Vec<String> {
    schema
        .fields
        .iter()
        .filter(|f| pred(f))
        .map(|f| f.name.clone())
        .collect()
}

fn field_type_hint(schema: &StorageSchema, name: &str) -> String {
    schema
        .field(name)
        .map(|f| match &f.kind {
            FieldKind::Relation { target } => format!("ref[{}]", target),
            other => f.describe().primitive_type.to_string() + kind_suffix(other),
        })
        .unwrap_or_default()
}

fn kind_suffix(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Enum { .. } => ":enum",
        FieldKind::Media { .. } => ":media",
        FieldKind::Secret => ":secret",
        _ => "",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseRelation {
    pub source_field: String,
    pub target_entity: String,
    /// Field on the target holding ids of instances that reference it
    pub reverse_field: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseRelationPlan {
    pub entries: Vec<ReverseRelation>,
}

impl ReverseRelationPlan {
    pub fn for_field(&self, source_field: &str) -> Option<&ReverseRelation> {
        self.entries.iter().find(|e| e.source_field == source_field)
    }

    /// Distinct target entity types, in first-seen order.
    pub fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !targets.contains(&entry.target_entity.as_str()) {
                targets.push(&entry.target_entity);
            }
        }
        targets
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Name of the field on a relation target that lists referencing `source_entity` instances.
pub fn reverse_field_name(source_entity: &str) -> String {
    format!("{}s", source_entity.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_pagination_still_yields_a_positive_limit() {
        let zero = Pagination {
            default_limit: 0,
            max_limit: 0,
        };
        assert_eq!(zero.clamp(None), 1);
        assert_eq!(zero.clamp(Some(50)), 1);
        assert_eq!(
            zero.normalized(),
            Pagination {
                default_limit: 1,
                max_limit: 1
            }
        );

        let inverted = Pagination {
            default_limit: 40,
            max_limit: 25,
        };
        assert_eq!(inverted.clamp(None), 25);
        assert_eq!(inverted.clamp(Some(u64::MAX)), 25);
    }
}
