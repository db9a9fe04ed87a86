//! Wiring of catalog, registry, executor and schema service over a set of
//! collaborators.

use std::sync::Arc;

use morph_core::{AccessGate, DefinitionStore, DirtySignal, EntityStore};

use crate::catalog::{EntityTypeCatalog, MemoryDefinitionStore};
use crate::crud::{CrudConfig, CrudExecutor};
use crate::gate::AllowAll;
use crate::registry::LiveModelRegistry;
use crate::service::SchemaService;
use crate::storage::MemoryEntityStore;

pub struct Platform {
    pub catalog: Arc<EntityTypeCatalog>,
    pub registry: Arc<LiveModelRegistry>,
    pub executor: Arc<CrudExecutor>,
    pub schemas: Arc<SchemaService>,
}

impl Platform {
    pub fn builder() -> PlatformBuilder {
        PlatformBuilder::default()
    }
}

/// Unset collaborators default to in-memory stores and [`AllowAll`].
#[derive(Default)]
pub struct PlatformBuilder {
    definitions: Option<Arc<dyn DefinitionStore>>,
    entities: Option<Arc<dyn EntityStore>>,
    gate: Option<Arc<dyn AccessGate>>,
    dirty: Option<Arc<dyn DirtySignal>>,
    config: CrudConfig,
}

impl PlatformBuilder {
    pub fn definitions(mut self, store: Arc<dyn DefinitionStore>) -> Self {
        self.definitions = Some(store);
        self
    }

    pub fn entities(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.entities = Some(store);
        self
    }

    pub fn gate(mut self, gate: Arc<dyn AccessGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn dirty_signal(mut self, dirty: Arc<dyn DirtySignal>) -> Self {
        self.dirty = Some(dirty);
        self
    }

    pub fn config(mut self, config: CrudConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Platform {
        let definitions: Arc<dyn DefinitionStore> = match self.definitions {
            Some(store) => store,
            None => Arc::new(MemoryDefinitionStore::new()),
        };
        let entities: Arc<dyn EntityStore> = match self.entities {
            Some(store) => store,
            None => Arc::new(MemoryEntityStore::new()),
        };
        let gate: Arc<dyn AccessGate> = match self.gate {
            Some(gate) => gate,
            None => Arc::new(AllowAll),
        };

        let catalog = Arc::new(EntityTypeCatalog::new(definitions));

        let mut registry = LiveModelRegistry::new(catalog.clone());
        let mut schemas = SchemaService::new(catalog.clone(), entities.clone());
        if let Some(dirty) = self.dirty {
            registry = registry.with_dirty_signal(dirty.clone());
            schemas = schemas.with_dirty_signal(dirty);
        }
        let registry = Arc::new(registry);

        let executor = Arc::new(
            CrudExecutor::new(registry.clone(), entities, gate).with_config(self.config),
        );

        Platform {
            catalog,
            registry,
            executor,
            schemas: Arc::new(schemas),
        }
    }
}
