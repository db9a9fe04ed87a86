//! Entity type catalog
//!
//! Durable record of entity type definitions; the source of truth the live
//! model registry compiles from. Every write compiles the submitted fields
//! first, so an invalid definition is never persisted, and stamps a fresh
//! store-wide revision. The catalog never calls the registry: the revision is
//! the only staleness signal, which lets another process mutate the same
//! backing store.

mod file;
mod memory;

use std::sync::Arc;

use chrono::Utc;
use morph_api::{ApiError, EntityTypeDefinition, FieldDescriptor, Result};
use morph_core::DefinitionStore;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::compiler::{self, CompiledArtifacts, reverse_field_name};

pub use file::JsonFileDefinitionStore;
pub use memory::MemoryDefinitionStore;

/// A relation field on `source_entity` that points at some target type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingRelation {
    pub source_entity: String,
    pub source_field: String,
    /// Field on the target listing referencing `source_entity` ids
    pub reverse_field: String,
}

pub struct EntityTypeCatalog {
    store: Arc<dyn DefinitionStore>,
    write_lock: Mutex<()>,
}

/// Canonical form of an entity type name.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Canonical name, or `None` when it cannot name any entity type. Such names
/// never reach the definition store.
fn lookup_name(name: &str) -> Option<String> {
    let name = normalize_name(name);
    compiler::is_identifier(&name).then_some(name)
}

fn normalize_fields(fields: Vec<FieldDescriptor>) -> Vec<FieldDescriptor> {
    fields
        .into_iter()
        .map(|mut field| {
            field.name = field.name.trim().to_string();
            if let Some(target) = field.relation_target.as_mut() {
                *target = normalize_name(target);
            }
            field
        })
        .collect()
}

impl EntityTypeCatalog {
    pub fn new(store: Arc<dyn DefinitionStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn define(
        &self,
        name: &str,
        fields: Vec<FieldDescriptor>,
    ) -> Result<EntityTypeDefinition> {
        let name = normalize_name(name);
        let fields = normalize_fields(fields);
        let artifacts = compiler::compile(&name, &fields)?;

        let _guard = self.write_lock.lock().await;
        if self.store.load(&name).await?.is_some() {
            return Err(ApiError::AlreadyExists { name });
        }
        let existing = self.store.load_all().await?;
        check_reverse_collisions(&name, &fields, &artifacts, &existing)?;

        let revision = self.store.next_revision().await?;
        let now = Utc::now();
        let definition = EntityTypeDefinition {
            name,
            fields,
            created_at: now,
            updated_at: now,
            revision,
        };
        self.store.save(&definition).await?;

        info!(
            "[EntityTypeCatalog] Defined '{}' ({} fields) at revision {}",
            definition.name,
            definition.fields.len(),
            revision
        );
        Ok(definition)
    }

    /// Replace the field list wholesale.
    pub async fn redefine(
        &self,
        name: &str,
        fields: Vec<FieldDescriptor>,
    ) -> Result<EntityTypeDefinition> {
        let name = normalize_name(name);
        let fields = normalize_fields(fields);
        let artifacts = compiler::compile(&name, &fields)?;

        let _guard = self.write_lock.lock().await;
        let Some(current) = self.store.load(&name).await? else {
            return Err(ApiError::not_found(format!("entity type '{}'", name)));
        };
        let existing = self.store.load_all().await?;
        check_reverse_collisions(&name, &fields, &artifacts, &existing)?;

        let revision = self.store.next_revision().await?;
        let definition = EntityTypeDefinition {
            name,
            fields,
            created_at: current.created_at,
            updated_at: Utc::now(),
            revision,
        };
        self.store.save(&definition).await?;

        info!(
            "[EntityTypeCatalog] Redefined '{}': revision {} -> {}",
            definition.name, current.revision, revision
        );
        Ok(definition)
    }

    pub async fn remove(&self, name: &str) -> Result<EntityTypeDefinition> {
        let Some(name) = lookup_name(name) else {
            return Err(ApiError::not_found(format!("entity type '{}'", name.trim())));
        };
        let _guard = self.write_lock.lock().await;
        let Some(current) = self.store.load(&name).await? else {
            return Err(ApiError::not_found(format!("entity type '{}'", name)));
        };
        self.store.delete(&name).await?;

        let dependents = dependents_in(&self.store.load_all().await?, &name);
        if !dependents.is_empty() {
            warn!(
                "[EntityTypeCatalog] Removed '{}' while {} relation field(s) still target it",
                name,
                dependents.len()
            );
        }
        info!("[EntityTypeCatalog] Removed '{}'", name);
        Ok(current)
    }

    pub async fn get(&self, name: &str) -> Result<Option<EntityTypeDefinition>> {
        match lookup_name(name) {
            Some(name) => Ok(self.store.load(&name).await?),
            None => Ok(None),
        }
    }

    pub async fn list(&self) -> Result<Vec<EntityTypeDefinition>> {
        Ok(self.store.load_all().await?)
    }

    /// Relation fields of other entity types that target `target`.
    pub async fn dependents(&self, target: &str) -> Result<Vec<IncomingRelation>> {
        let Some(target) = lookup_name(target) else {
            return Ok(Vec::new());
        };
        Ok(dependents_in(&self.store.load_all().await?, &target))
    }
}

fn dependents_in(definitions: &[EntityTypeDefinition], target: &str) -> Vec<IncomingRelation> {
    definitions
        .iter()
        .flat_map(|definition| {
            definition
                .relations_to(target)
                .map(move |field| IncomingRelation {
                    source_entity: definition.name.clone(),
                    source_field: field.name.clone(),
                    reverse_field: reverse_field_name(&definition.name),
                })
        })
        .collect()
}

/// A declared field may share a reverse field's name only when it is itself a
/// relation back to the referencing type.
fn is_back_reference(field: &FieldDescriptor, source_entity: &str) -> bool {
    field.relation_target.as_deref() == Some(source_entity)
}

fn check_reverse_collisions(
    name: &str,
    fields: &[FieldDescriptor],
    artifacts: &CompiledArtifacts,
    existing: &[EntityTypeDefinition],
) -> Result<()> {
    // Outgoing: our reverse field must not clash with a field on each target.
    for entry in &artifacts.reverse_relation_plan.entries {
        let target_fields: &[FieldDescriptor] = if entry.target_entity == name {
            fields
        } else {
            match existing.iter().find(|d| d.name == entry.target_entity) {
                Some(definition) => &definition.fields,
                None => continue,
            }
        };
        if let Some(field) = target_fields.iter().find(|f| f.name == entry.reverse_field)
            && !is_back_reference(field, name)
        {
            return Err(ApiError::invalid_descriptor(format!(
                "'{}.{}' would be overwritten by the reverse field of '{}.{}'",
                entry.target_entity, entry.reverse_field, name, entry.source_field
            )));
        }
    }

    // Incoming: existing types pointing at us own reverse fields on our instances.
    for incoming in dependents_in(existing, name) {
        if incoming.source_entity == name {
            continue;
        }
        if let Some(field) = fields.iter().find(|f| f.name == incoming.reverse_field)
            && !is_back_reference(field, &incoming.source_entity)
        {
            return Err(ApiError::invalid_descriptor(format!(
                "field '{}' is the reverse field of '{}.{}'",
                field.name, incoming.source_entity, incoming.source_field
            )));
        }
    }
    Ok(())
}
