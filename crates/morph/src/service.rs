//! Schema administration: catalog writes plus the cross-entity work a rename
//! needs.

use std::sync::Arc;

use morph_api::{ApiError, EntityTypeDefinition, FieldDescriptor, Result, document_id};
use morph_core::{DirtySignal, EntityStore, Filter, FindOptions, Update};
use tracing::{info, warn};

use crate::catalog::{EntityTypeCatalog, normalize_name};
use crate::compiler::reverse_field_name;

pub struct SchemaService {
    catalog: Arc<EntityTypeCatalog>,
    store: Arc<dyn EntityStore>,
    dirty: Option<Arc<dyn DirtySignal>>,
}

impl SchemaService {
    pub fn new(catalog: Arc<EntityTypeCatalog>, store: Arc<dyn EntityStore>) -> Self {
        Self {
            catalog,
            store,
            dirty: None,
        }
    }

    /// Also announce every change on `dirty`, for processes that share it.
    pub fn with_dirty_signal(mut self, dirty: Arc<dyn DirtySignal>) -> Self {
        self.dirty = Some(dirty);
        self
    }

    pub fn catalog(&self) -> &Arc<EntityTypeCatalog> {
        &self.catalog
    }

    pub async fn list(&self) -> Result<Vec<EntityTypeDefinition>> {
        self.catalog.list().await
    }

    pub async fn get(&self, name: &str) -> Result<EntityTypeDefinition> {
        self.catalog
            .get(name)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("entity type '{}'", normalize_name(name))))
    }

    pub async fn define(
        &self,
        name: &str,
        fields: Vec<FieldDescriptor>,
    ) -> Result<EntityTypeDefinition> {
        let definition = self.catalog.define(name, fields).await?;
        self.announce(&definition.name).await;
        Ok(definition)
    }

    pub async fn redefine(
        &self,
        name: &str,
        fields: Vec<FieldDescriptor>,
    ) -> Result<EntityTypeDefinition> {
        let definition = self.catalog.redefine(name, fields).await?;
        self.announce(&definition.name).await;
        Ok(definition)
    }

    /// Remove the definition. Stored instances are left in place.
    pub async fn remove(&self, name: &str) -> Result<EntityTypeDefinition> {
        let definition = self.catalog.remove(name).await?;
        self.announce(&definition.name).await;
        Ok(definition)
    }

    /// Rename an entity type, carrying its instances, the reverse fields it
    /// owns on its relation targets, and every relation that points at it.
    ///
    /// Steps are applied in order and not rolled back on failure.
    pub async fn rename(&self, old: &str, new: &str) -> Result<EntityTypeDefinition> {
        let old = normalize_name(old);
        let new = normalize_name(new);
        let current = self.get(&old).await?;
        if self.catalog.get(&new).await?.is_some() {
            return Err(ApiError::AlreadyExists { name: new });
        }

        let fields = retarget(&current.fields, &old, &new);
        let renamed = self.catalog.define(&new, fields).await?;
        info!("[SchemaService] rename {} -> {}: defined", old, new);

        self.store.rename_collection(&old, &new).await?;
        info!("[SchemaService] rename {} -> {}: moved instances", old, new);

        let (old_reverse, new_reverse) = (reverse_field_name(&old), reverse_field_name(&new));
        let mut targets: Vec<&str> = renamed
            .fields
            .iter()
            .filter_map(|f| f.relation_target.as_deref())
            .collect();
        targets.sort_unstable();
        targets.dedup();
        for target in targets {
            let moved = self
                .rename_field(target, &old_reverse, &new_reverse)
                .await?;
            info!(
                "[SchemaService] rename {} -> {}: {}.{} -> {} on {} instance(s)",
                old, new, target, old_reverse, new_reverse, moved
            );
        }

        for dependent in self.catalog.list().await? {
            if dependent.name == old || dependent.name == new {
                continue;
            }
            if dependent.relations_to(&old).next().is_none() {
                continue;
            }
            let fields = retarget(&dependent.fields, &old, &new);
            self.catalog.redefine(&dependent.name, fields).await?;
            self.announce(&dependent.name).await;
            info!(
                "[SchemaService] rename {} -> {}: retargeted '{}'",
                old, new, dependent.name
            );
        }

        self.catalog.remove(&old).await?;
        self.announce(&old).await;
        info!("[SchemaService] Renamed entity type {} -> {}", old, new);
        Ok(renamed)
    }

    async fn rename_field(&self, entity: &str, from: &str, to: &str) -> Result<usize> {
        let found = self
            .store
            .find(
                entity,
                &Filter::IsNotNull(from.to_string()),
                &FindOptions::default(),
            )
            .await?;
        let mut moved = 0;
        for doc in found.docs {
            let (Some(id), Some(value)) = (document_id(&doc), doc.get(from)) else {
                continue;
            };
            let update = Update::new().set(to, value.clone()).unset(from);
            if self.store.update_one(entity, id, &update).await?.is_some() {
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn announce(&self, name: &str) {
        if let Some(dirty) = &self.dirty
            && let Err(e) = dirty.mark(name).await
        {
            warn!("[SchemaService] Failed to mark '{}' dirty: {}", name, e);
        }
    }
}

fn retarget(fields: &[FieldDescriptor], from: &str, to: &str) -> Vec<FieldDescriptor> {
    fields
        .iter()
        .cloned()
        .map(|mut field| {
            if field.relation_target.as_deref() == Some(from) {
                field.relation_target = Some(to.to_string());
            }
            field
        })
        .collect()
}
