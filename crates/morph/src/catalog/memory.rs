use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use morph_api::EntityTypeDefinition;
use morph_core::{DefinitionStore, Result};
use tokio::sync::RwLock;

/// HashMap-backed definition store for tests and single-process setups.
#[derive(Debug, Default)]
pub struct MemoryDefinitionStore {
    definitions: RwLock<HashMap<String, EntityTypeDefinition>>,
    revision: AtomicU64,
}

impl MemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DefinitionStore for MemoryDefinitionStore {
    async fn load(&self, name: &str) -> Result<Option<EntityTypeDefinition>> {
        Ok(self.definitions.read().await.get(name).cloned())
    }

    async fn load_all(&self) -> Result<Vec<EntityTypeDefinition>> {
        let mut all: Vec<_> = self.definitions.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn save(&self, definition: &EntityTypeDefinition) -> Result<()> {
        self.definitions
            .write()
            .await
            .insert(definition.name.clone(), definition.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.definitions.write().await.remove(name).is_some())
    }

    async fn next_revision(&self) -> Result<u64> {
        Ok(self.revision.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
