//! morph: runtime entity types
//!
//! Operators declare entity types (a name plus typed field descriptors) while
//! the process runs. For each one the engine compiles a storage schema, a CRUD
//! plan with search/sort/filter/pagination, and a reverse-relation plan, then
//! serves it through a generic executor without a restart.
//!
//! - `compiler`: pure descriptor -> artifact compilation
//! - `catalog`: durable definitions with a store-wide revision counter
//! - `registry`: revision-checked cache of compiled handles
//! - `relations`: reverse-field bookkeeping after writes
//! - `crud`: the executor behind every generated operation
//! - `service`: schema administration, including rename cascades

pub mod catalog;
pub mod compiler;
pub mod crud;
pub mod dirty;
pub mod gate;
pub mod platform;
pub mod registry;
pub mod relations;
pub mod service;
pub mod storage;
pub mod testing;

pub use catalog::{EntityTypeCatalog, IncomingRelation, JsonFileDefinitionStore, MemoryDefinitionStore};
pub use compiler::{CompiledArtifacts, compile};
pub use crud::{CrudConfig, CrudExecutor, CrudRequest, CrudResponse, MutationOutcome};
pub use dirty::{FileDirtySignal, MemoryDirtySignal};
pub use gate::{AllowAll, RoleTable};
pub use platform::{Platform, PlatformBuilder};
pub use registry::{CompiledHandle, LiveModelRegistry, RegistryEntry};
pub use relations::{RelationMaintainer, SyncReport};
pub use service::SchemaService;
pub use storage::MemoryEntityStore;
