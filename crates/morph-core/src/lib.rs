//! Collaborator boundaries for morph
//!
//! The engine never talks to a database, a file system or an authorization
//! service directly; it goes through the traits defined here:
//!
//! - [`EntityStore`]: opaque document store keyed by entity name + id
//! - [`DefinitionStore`]: durable backing store of the entity type catalog
//! - [`DirtySignal`]: out-of-process "definition changed" marker
//! - [`AccessGate`]: role/action authorization decision

pub mod error;
pub mod query;
pub mod traits;

pub use error::{Result, StorageError};
pub use query::{Filter, FindOptions, FindResult, SortKey, Update, UpdatedDocument};
pub use traits::{AccessGate, DefinitionStore, DirtySignal, EntityStore};
