//! Test helpers shared by unit tests, property tests and cucumber steps.

use std::sync::Arc;

use morph_api::{Document, FieldDescriptor, ID_FIELD, ReadQuery, Result};
use morph_core::{AccessGate, EntityStore};
use serde_json::Value;

use crate::crud::CrudConfig;
use crate::gate::AllowAll;
use crate::platform::Platform;
use crate::storage::MemoryEntityStore;

/// Role used by helpers that do not care about authorization.
pub const TEST_ROLE: &str = "admin";

/// A fully in-memory platform with direct access to its entity store.
pub struct TestPlatform {
    pub platform: Platform,
    pub store: Arc<MemoryEntityStore>,
}

impl Default for TestPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPlatform {
    pub fn new() -> Self {
        Self::with_gate(Arc::new(AllowAll))
    }

    pub fn with_gate(gate: Arc<dyn AccessGate>) -> Self {
        let store = Arc::new(MemoryEntityStore::new());
        let platform = Platform::builder()
            .entities(store.clone())
            .gate(gate)
            .config(CrudConfig::default())
            .build();
        Self { platform, store }
    }

    pub async fn define(&self, name: &str, fields: Vec<FieldDescriptor>) -> Result<()> {
        self.platform.schemas.define(name, fields).await.map(|_| ())
    }

    /// Create an instance and return its id.
    pub async fn create(&self, entity: &str, payload: Value) -> Result<String> {
        let outcome = self
            .platform
            .executor
            .create(TEST_ROLE, entity, to_document(payload))
            .await?;
        Ok(outcome
            .document
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    pub async fn update(&self, entity: &str, payload: Value) -> Result<Document> {
        self.platform
            .executor
            .update(TEST_ROLE, entity, to_document(payload))
            .await
            .map(|outcome| outcome.document)
    }

    pub async fn read_one(&self, entity: &str, id: &str) -> Result<Document> {
        let result = self
            .platform
            .executor
            .read(TEST_ROLE, entity, &ReadQuery::by_id(id))
            .await?;
        Ok(result.into_document().unwrap_or_default())
    }

    /// Stored document, bypassing the executor (secrets included).
    pub async fn raw(&self, entity: &str, id: &str) -> Option<Document> {
        self.store.find_by_id(entity, id).await.ok().flatten()
    }
}

/// JSON object to document; anything else becomes an empty document.
pub fn to_document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}
