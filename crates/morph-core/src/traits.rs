use async_trait::async_trait;
use morph_api::{CrudAction, Document, EntityTypeDefinition};

use crate::query::{Filter, FindOptions, FindResult, Update, UpdatedDocument};
use crate::Result;

/// Document store holding entity instances, one collection per entity type.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Insert `doc` into `entity`'s collection; assigns an `_id` when absent.
    async fn create(&self, entity: &str, doc: Document) -> Result<String>;

    async fn find_by_id(&self, entity: &str, id: &str) -> Result<Option<Document>>;

    async fn find(&self, entity: &str, filter: &Filter, options: &FindOptions)
        -> Result<FindResult>;

    async fn count(&self, entity: &str, filter: &Filter) -> Result<usize>;

    /// Apply `update` atomically and return the document as it was right
    /// before and right after, or `None` if no such id.
    async fn update_one(&self, entity: &str, id: &str, update: &Update)
        -> Result<Option<UpdatedDocument>>;

    /// Returns the removed document, or `None` if no such id.
    async fn delete_one(&self, entity: &str, id: &str) -> Result<Option<Document>>;

    /// Relabel a whole collection; a missing source collection is a no-op.
    async fn rename_collection(&self, from: &str, to: &str) -> Result<()>;
}

/// Durable backing store of the entity type catalog.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn load(&self, name: &str) -> Result<Option<EntityTypeDefinition>>;

    async fn load_all(&self) -> Result<Vec<EntityTypeDefinition>>;

    async fn save(&self, definition: &EntityTypeDefinition) -> Result<()>;

    /// Returns whether a definition was removed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Next value of the store-wide modification counter. Strictly increasing
    /// for the lifetime of the store, including across delete and re-create.
    async fn next_revision(&self) -> Result<u64>;
}

/// Single named "this entity type changed" marker, shared with other processes.
///
/// At most one name is pending; `take` reads and clears it.
#[async_trait]
pub trait DirtySignal: Send + Sync {
    async fn mark(&self, entity: &str) -> Result<()>;

    async fn take(&self) -> Result<Option<String>>;
}

/// Role/action authorization decision, consulted before every CRUD operation.
pub trait AccessGate: Send + Sync {
    fn permits(&self, role: &str, action: CrudAction) -> bool;
}
