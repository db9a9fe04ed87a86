//! Schema compiler
//!
//! Pure, deterministic translation of an entity type's field descriptors into
//! the artifacts the rest of the engine executes against:
//!
//! - [`StorageSchema`]: per-field storage kind (scalar, enum, relation, media, secret)
//! - [`CrudPlan`]: the four operations tagged with their permission action, plus
//!   the search/sort/filter/pagination contract
//! - [`ReverseRelationPlan`]: one entry per relation field
//!
//! No I/O happens here. Invalid descriptors fail with `InvalidDescriptor`
//! before anything is persisted.

mod field;
mod plan;
mod seo;

use std::collections::HashSet;

use morph_api::{ApiError, FieldDescriptor, Result};
use serde::{Deserialize, Serialize};

pub use field::{FieldKind, ScalarType, StorageField, is_identifier, is_media_hint};
pub use plan::{
    CrudPlan, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, Pagination, ReverseRelation,
    ReverseRelationPlan, StorageSchema, reverse_field_name,
};
pub use seo::{SEO_FIELDS, is_seo_field};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledArtifacts {
    pub entity_name: String,
    pub storage_schema: StorageSchema,
    pub crud_plan: CrudPlan,
    pub reverse_relation_plan: ReverseRelationPlan,
}

pub fn compile(entity_name: &str, fields: &[FieldDescriptor]) -> Result<CompiledArtifacts> {
    if !is_identifier(entity_name) || entity_name.starts_with('_') {
        return Err(ApiError::invalid_descriptor(format!(
            "entity name '{}' is not an identifier",
            entity_name
        )));
    }

    let mut seen = HashSet::new();
    let mut storage_fields = Vec::with_capacity(fields.len() + SEO_FIELDS.len());
    for descriptor in fields {
        if !seen.insert(descriptor.name.as_str()) {
            return Err(ApiError::invalid_descriptor(format!(
                "duplicate field '{}'",
                descriptor.name
            )));
        }
        storage_fields.push(field::classify(descriptor)?);
    }
    seo::augment(&mut storage_fields)?;

    let storage_schema = StorageSchema {
        fields: storage_fields,
    };

    let reverse_field = reverse_field_name(entity_name);
    let reverse_relation_plan = ReverseRelationPlan {
        entries: storage_schema
            .relation_fields()
            .map(|(field, target)| ReverseRelation {
                source_field: field.name.clone(),
                target_entity: target.to_string(),
                reverse_field: reverse_field.clone(),
            })
            .collect(),
    };

    let crud_plan = CrudPlan::build(entity_name, &storage_schema);

    Ok(CompiledArtifacts {
        entity_name: entity_name.to_string(),
        storage_schema,
        crud_plan,
        reverse_relation_plan,
    })
}
