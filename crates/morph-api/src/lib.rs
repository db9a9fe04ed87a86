//! Shared API crate for morph
//!
//! Technology-agnostic types shared by the engine (`morph`), the collaborator
//! traits (`morph-core`) and the frontends.
//!
//! - `descriptor`: field descriptors, the declarative input of the schema compiler
//! - `definition`: persisted entity type definitions
//! - `action`: the four permission actions consulted by the access gate
//! - `operation`: self-describing operation metadata emitted into CRUD plans
//! - `document`: instance documents and the system fields stamped on them
//! - `query`: the read surface (query parameters in, pages out)
//! - `error`: structured errors that cross the HTTP boundary

pub mod action;
pub mod definition;
pub mod descriptor;
pub mod document;
pub mod error;
pub mod operation;
pub mod query;

pub use action::CrudAction;
pub use definition::EntityTypeDefinition;
pub use descriptor::{FieldDescriptor, PrimitiveType};
pub use document::{
    document_id, id_list, Document, CREATED_AT_FIELD, ID_FIELD, SYSTEM_FIELDS, UPDATED_AT_FIELD,
};
pub use error::{ApiError, RelationSyncFailure, Result};
pub use operation::{OperationDescriptor, OperationParam};
pub use query::{Page, ReadQuery, ReadResult};
