//! Live model registry
//!
//! Process-wide cache from entity type name to its compiled artifacts. Entries
//! are immutable `Arc`s replaced wholesale (copy-then-swap), so an operation
//! holding a handle keeps a consistent view while a newer one is installed.
//!
//! Freshness is decided on every `resolve` by comparing the cached revision
//! with the catalog's stored revision; nothing pushes invalidations here
//! except the optional out-of-process dirty signal.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use morph_api::{ApiError, Result};
use morph_core::DirtySignal;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::catalog::{EntityTypeCatalog, normalize_name};
use crate::compiler::{self, CompiledArtifacts};

#[derive(Debug)]
pub struct RegistryEntry {
    pub entity_name: String,
    pub artifacts: CompiledArtifacts,
    /// Catalog revision this entry was compiled from
    pub revision: u64,
    pub compiled_at: DateTime<Utc>,
}

pub type CompiledHandle = Arc<RegistryEntry>;

pub struct LiveModelRegistry {
    catalog: Arc<EntityTypeCatalog>,
    dirty: Option<Arc<dyn DirtySignal>>,
    entries: RwLock<HashMap<String, CompiledHandle>>,
    compile_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    compilations: AtomicU64,
}

impl LiveModelRegistry {
    pub fn new(catalog: Arc<EntityTypeCatalog>) -> Self {
        Self {
            catalog,
            dirty: None,
            entries: RwLock::new(HashMap::new()),
            compile_locks: Mutex::new(HashMap::new()),
            compilations: AtomicU64::new(0),
        }
    }

    pub fn with_dirty_signal(mut self, dirty: Arc<dyn DirtySignal>) -> Self {
        self.dirty = Some(dirty);
        self
    }

    pub fn catalog(&self) -> &Arc<EntityTypeCatalog> {
        &self.catalog
    }

    /// Current compiled handle for `name`, recompiling if the catalog moved on.
    pub async fn resolve(&self, name: &str) -> Result<CompiledHandle> {
        let name = normalize_name(name);
        self.drain_dirty().await;

        let Some(definition) = self.catalog.get(&name).await? else {
            if self.entries.write().await.remove(&name).is_some() {
                debug!("[LiveModelRegistry] Evicted '{}': no longer in catalog", name);
            }
            self.release_compile_lock(&name).await;
            return Err(ApiError::unknown_entity(name));
        };

        if let Some(entry) = self.cached(&name, definition.revision).await {
            return Ok(entry);
        }

        let lock = self.compile_lock(&name).await;
        let _guard = lock.lock().await;

        // Another resolve may have compiled while we waited.
        if let Some(entry) = self.cached(&name, definition.revision).await {
            return Ok(entry);
        }

        let artifacts = compiler::compile(&definition.name, &definition.fields).map_err(|e| {
            warn!(
                "[LiveModelRegistry] Stored definition '{}' no longer compiles: {}",
                name, e
            );
            e
        })?;
        let entry = Arc::new(RegistryEntry {
            entity_name: definition.name.clone(),
            artifacts,
            revision: definition.revision,
            compiled_at: Utc::now(),
        });
        self.compilations.fetch_add(1, Ordering::SeqCst);

        let mut entries = self.entries.write().await;
        let installed = match entries.get(&name) {
            // A newer revision won the race; keep it.
            Some(existing) if existing.revision > entry.revision => existing.clone(),
            _ => {
                entries.insert(name.clone(), entry.clone());
                entry
            }
        };
        info!(
            "[LiveModelRegistry] Compiled '{}' at revision {}",
            name, installed.revision
        );
        Ok(installed)
    }

    /// Drop the cached entry; the next resolve recompiles.
    pub async fn invalidate(&self, name: &str) {
        let name = normalize_name(name);
        if self.entries.write().await.remove(&name).is_some() {
            debug!("[LiveModelRegistry] Invalidated '{}'", name);
        }
        self.release_compile_lock(&name).await;
    }

    /// Number of compilations performed since construction.
    pub fn compilation_count(&self) -> u64 {
        self.compilations.load(Ordering::SeqCst)
    }

    pub async fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn cached(&self, name: &str, revision: u64) -> Option<CompiledHandle> {
        self.entries
            .read()
            .await
            .get(name)
            .filter(|entry| entry.revision >= revision)
            .cloned()
    }

    async fn compile_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.compile_locks
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Forget `name`'s compile lock unless a resolve holds or awaits it.
    async fn release_compile_lock(&self, name: &str) {
        let mut locks = self.compile_locks.lock().await;
        if locks.get(name).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(name);
        }
    }

    async fn drain_dirty(&self) {
        let Some(dirty) = &self.dirty else {
            return;
        };
        match dirty.take().await {
            Ok(Some(name)) => {
                debug!("[LiveModelRegistry] Dirty signal for '{}'", name);
                self.invalidate(&name).await;
            }
            Ok(None) => {}
            Err(e) => warn!("[LiveModelRegistry] Failed to read dirty signal: {}", e),
        }
    }
}
