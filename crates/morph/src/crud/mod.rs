//! Generic CRUD executor
//!
//! Runs the compiled CRUD plan of any entity type. Every operation follows
//! the same order: resolve the handle through the registry, ask the access
//! gate, validate, touch the entity store, then let the relation maintainer
//! fix up reverse fields. Authorization and invariant failures happen before
//! any entity store access.

mod guard;
mod locks;
mod request;
mod validate;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use morph_api::{
    ApiError, CREATED_AT_FIELD, CrudAction, Document, ID_FIELD, Page, ReadQuery, ReadResult,
    Result, UPDATED_AT_FIELD, document_id, id_list,
};
use morph_core::{AccessGate, EntityStore, Filter, FindOptions};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, warn};

use crate::compiler::{Pagination, StorageSchema};
use crate::registry::{CompiledHandle, LiveModelRegistry};
use locks::InstanceLocks;
use crate::relations::{RelationMaintainer, SyncReport, combine};

pub use guard::AdminGuard;
pub use request::{PopulateTarget, ReadPlan, parse_filter, parse_sort, plan_read, search_filter};
pub use validate::{coerce, format_timestamp, hash_secret, prepare_create, prepare_update};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrudConfig {
    /// Overrides the compiled pagination contract when set
    pub pagination: Option<Pagination>,
    pub admin_guard: Option<AdminGuard>,
}

impl Default for CrudConfig {
    fn default() -> Self {
        Self {
            pagination: None,
            admin_guard: Some(AdminGuard::default()),
        }
    }
}

/// Result of a create, update or delete.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    /// The instance as a reader would see it (secrets stripped)
    pub document: Document,
    pub sync: SyncReport,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrudRequest {
    Create { entity: String, payload: Document },
    Read { entity: String, query: ReadQuery },
    Update { entity: String, payload: Document },
    Delete { entity: String, id: String },
}

impl CrudRequest {
    pub fn entity(&self) -> &str {
        match self {
            CrudRequest::Create { entity, .. }
            | CrudRequest::Read { entity, .. }
            | CrudRequest::Update { entity, .. }
            | CrudRequest::Delete { entity, .. } => entity,
        }
    }

    pub fn action(&self) -> CrudAction {
        match self {
            CrudRequest::Create { .. } => CrudAction::Create,
            CrudRequest::Read { .. } => CrudAction::Read,
            CrudRequest::Update { .. } => CrudAction::Update,
            CrudRequest::Delete { .. } => CrudAction::Delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrudResponse {
    Created(MutationOutcome),
    Read(ReadResult),
    Updated(MutationOutcome),
    Deleted(MutationOutcome),
}

impl CrudResponse {
    pub fn into_read(self) -> Option<ReadResult> {
        match self {
            CrudResponse::Read(result) => Some(result),
            _ => None,
        }
    }

    /// Outcome of a create, update or delete.
    pub fn into_mutation(self) -> Option<MutationOutcome> {
        match self {
            CrudResponse::Created(outcome)
            | CrudResponse::Updated(outcome)
            | CrudResponse::Deleted(outcome) => Some(outcome),
            CrudResponse::Read(_) => None,
        }
    }
}

pub struct CrudExecutor {
    registry: Arc<LiveModelRegistry>,
    store: Arc<dyn EntityStore>,
    gate: Arc<dyn AccessGate>,
    relations: RelationMaintainer,
    config: CrudConfig,
    guard_lock: Mutex<()>,
    instance_locks: InstanceLocks,
}

impl CrudExecutor {
    pub fn new(
        registry: Arc<LiveModelRegistry>,
        store: Arc<dyn EntityStore>,
        gate: Arc<dyn AccessGate>,
    ) -> Self {
        Self {
            registry,
            relations: RelationMaintainer::new(store.clone()),
            store,
            gate,
            config: CrudConfig::default(),
            guard_lock: Mutex::new(()),
            instance_locks: InstanceLocks::default(),
        }
    }

    pub fn with_config(mut self, config: CrudConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<LiveModelRegistry> {
        &self.registry
    }

    /// Run a request on behalf of `role`.
    pub async fn execute(&self, role: &str, request: CrudRequest) -> Result<CrudResponse> {
        let span = tracing::span!(
            tracing::Level::INFO,
            "crud.execute",
            "operation.entity" = request.entity(),
            "operation.action" = request.action().as_str(),
            "operation.role" = role
        );

        async {
            debug!(
                "[CrudExecutor] execute: entity={}, action={}, role={}",
                request.entity(),
                request.action(),
                role
            );
            match request {
                CrudRequest::Create { entity, payload } => self
                    .create(role, &entity, payload)
                    .await
                    .map(CrudResponse::Created),
                CrudRequest::Read { entity, query } => {
                    self.read(role, &entity, &query).await.map(CrudResponse::Read)
                }
                CrudRequest::Update { entity, payload } => self
                    .update(role, &entity, payload)
                    .await
                    .map(CrudResponse::Updated),
                CrudRequest::Delete { entity, id } => self
                    .delete(role, &entity, &id)
                    .await
                    .map(CrudResponse::Deleted),
            }
        }
        .instrument(span)
        .await
    }

    fn authorize(&self, handle: &CompiledHandle, role: &str, operation: &str) -> Result<()> {
        let action = handle
            .artifacts
            .crud_plan
            .action_for(operation)
            .ok_or_else(|| ApiError::Internal {
                message: format!("{} has no '{}' operation", handle.entity_name, operation),
            })?;
        if self.gate.permits(role, action) {
            return Ok(());
        }
        warn!(
            "[CrudExecutor] Denied {} on '{}' for role '{}'",
            action, handle.entity_name, role
        );
        Err(ApiError::AuthorizationDenied {
            role: role.to_string(),
            action,
            entity: handle.entity_name.clone(),
        })
    }

    pub async fn create(&self, role: &str, entity: &str, payload: Document) -> Result<MutationOutcome> {
        let handle = self.registry.resolve(entity).await?;
        self.authorize(&handle, role, "create")?;
        let artifacts = &handle.artifacts;

        let mut doc = prepare_create(&artifacts.storage_schema, payload)?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Value::String(format_timestamp(Utc::now()));
        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        doc.insert(CREATED_AT_FIELD.to_string(), now.clone());
        doc.insert(UPDATED_AT_FIELD.to_string(), now);

        self.store.create(&handle.entity_name, doc.clone()).await?;
        info!("[CrudExecutor] Created {}/{}", handle.entity_name, id);

        let sync = self
            .relations
            .on_create(&handle.entity_name, &id, &artifacts.reverse_relation_plan, &doc)
            .await;
        Ok(MutationOutcome {
            document: present(&artifacts.storage_schema, doc),
            sync,
        })
    }

    pub async fn read(&self, role: &str, entity: &str, query: &ReadQuery) -> Result<ReadResult> {
        let handle = self.registry.resolve(entity).await?;
        self.authorize(&handle, role, "read")?;
        let artifacts = &handle.artifacts;
        let incoming = self.registry.catalog().dependents(&handle.entity_name).await?;

        if let Some(id) = query.id.as_deref() {
            let (projection, populate) = request::plan_read_one(artifacts, &incoming, query)?;
            let doc = self
                .store
                .find_by_id(&handle.entity_name, id)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("{}/{}", handle.entity_name, id)))?;
            let doc = self
                .render(&handle, doc, projection.as_deref(), &populate)
                .await?;
            return Ok(ReadResult::One(doc));
        }

        let plan = plan_read(artifacts, &incoming, query, self.config.pagination)?;
        let found = self
            .store
            .find(&handle.entity_name, &plan.filter, &plan.options)
            .await?;
        debug!(
            "[CrudExecutor] Read {}: {} of {} match(es)",
            handle.entity_name,
            found.docs.len(),
            found.total
        );

        let mut items = Vec::with_capacity(found.docs.len());
        for doc in found.docs {
            items.push(
                self.render(&handle, doc, plan.projection.as_deref(), &plan.populate)
                    .await?,
            );
        }
        Ok(ReadResult::Page(Page {
            items,
            total: found.total,
            page: plan.page,
            limit: plan.limit,
            total_pages: found.total.div_ceil(plan.limit.max(1)),
        }))
    }

    /// Apply the fields present in `payload` to the instance named by its `_id`.
    pub async fn update(&self, role: &str, entity: &str, payload: Document) -> Result<MutationOutcome> {
        let handle = self.registry.resolve(entity).await?;
        self.authorize(&handle, role, "update")?;
        let artifacts = &handle.artifacts;

        let id = document_id(&payload)
            .map(str::to_string)
            .ok_or_else(|| ApiError::validation(ID_FIELD, "is required"))?;
        let update = prepare_update(&artifacts.storage_schema, payload)?
            .set(UPDATED_AT_FIELD, format_timestamp(Utc::now()));

        let _instance = self.instance_locks.acquire(&handle.entity_name, &id).await;
        let updated = self
            .store
            .update_one(&handle.entity_name, &id, &update)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("{}/{}", handle.entity_name, id)))?;
        info!("[CrudExecutor] Updated {}/{}", handle.entity_name, id);

        // Diff against the store's own pre-image, never an earlier read.
        let sync = self
            .relations
            .on_update(
                &handle.entity_name,
                &id,
                &artifacts.reverse_relation_plan,
                &updated.before,
                &updated.after,
            )
            .await;
        Ok(MutationOutcome {
            document: present(&artifacts.storage_schema, updated.after),
            sync,
        })
    }

    pub async fn delete(&self, role: &str, entity: &str, id: &str) -> Result<MutationOutcome> {
        let handle = self.registry.resolve(entity).await?;
        self.authorize(&handle, role, "delete")?;
        let artifacts = &handle.artifacts;
        let not_found = || ApiError::not_found(format!("{}/{}", handle.entity_name, id));

        let _instance = self.instance_locks.acquire(&handle.entity_name, id).await;
        let deleted = match self
            .config
            .admin_guard
            .as_ref()
            .filter(|guard| guard.applies_to(&artifacts.storage_schema))
        {
            Some(guard) => {
                // Count and delete under one lock so two deletes cannot both
                // see a second administrator.
                let _lock = self.guard_lock.lock().await;
                let doc = self
                    .store
                    .find_by_id(&handle.entity_name, id)
                    .await?
                    .ok_or_else(not_found)?;
                if guard.is_admin(&doc)
                    && self
                        .store
                        .count(&handle.entity_name, &guard.admin_filter())
                        .await?
                        <= 1
                {
                    warn!(
                        "[CrudExecutor] Refused to delete last administrator {}/{}",
                        handle.entity_name, id
                    );
                    return Err(ApiError::invariant("cannot remove last administrator"));
                }
                self.store.delete_one(&handle.entity_name, id).await?
            }
            None => self.store.delete_one(&handle.entity_name, id).await?,
        }
        .ok_or_else(not_found)?;
        info!("[CrudExecutor] Deleted {}/{}", handle.entity_name, id);

        let incoming = self.registry.catalog().dependents(&handle.entity_name).await?;
        let outgoing = self
            .relations
            .on_delete(&handle.entity_name, id, &artifacts.reverse_relation_plan, &deleted)
            .await;
        let detached = self
            .relations
            .detach_incoming(&handle.entity_name, id, &incoming, &deleted)
            .await;

        Ok(MutationOutcome {
            document: present(&artifacts.storage_schema, deleted),
            sync: combine([outgoing, detached]),
        })
    }

    async fn render(
        &self,
        handle: &CompiledHandle,
        mut doc: Document,
        projection: Option<&[String]>,
        populate: &[PopulateTarget],
    ) -> Result<Document> {
        for target in populate {
            let ids = id_list(doc.get(&target.field));
            let expanded = self.populate_ids(target, &ids).await?;
            doc.insert(target.field.clone(), Value::Array(expanded));
        }

        let mut doc = present(&handle.artifacts.storage_schema, doc);
        if let Some(projection) = projection {
            doc.retain(|key, _| projection.iter().any(|p| p == key));
        }
        Ok(doc)
    }

    async fn populate_ids(&self, target: &PopulateTarget, ids: &[String]) -> Result<Vec<Value>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let target_handle = match self.registry.resolve(&target.target_entity).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    "[CrudExecutor] Cannot populate '{}' from '{}': {}",
                    target.field, target.target_entity, e
                );
                return Ok(ids.iter().cloned().map(Value::String).collect());
            }
        };

        let filter = Filter::In(
            ID_FIELD.to_string(),
            ids.iter().cloned().map(Value::String).collect(),
        );
        let found = self
            .store
            .find(&target_handle.entity_name, &filter, &FindOptions::default())
            .await?;
        let mut by_id: HashMap<String, Document> = found
            .docs
            .into_iter()
            .filter_map(|doc| document_id(&doc).map(str::to_string).map(|id| (id, doc)))
            .collect();

        Ok(ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .map(|doc| Value::Object(strip_secrets(&target_handle.artifacts.storage_schema, doc)))
            .collect())
    }
}

fn strip_secrets(schema: &StorageSchema, mut doc: Document) -> Document {
    for field in schema.secret_fields() {
        doc.remove(&field.name);
    }
    doc
}

/// Reader view of a stored instance: secrets removed, SEO fields present.
fn present(schema: &StorageSchema, doc: Document) -> Document {
    let mut doc = strip_secrets(schema, doc);
    for field in schema.fields.iter().filter(|f| f.seo) {
        doc.entry(field.name.clone()).or_insert(Value::Null);
    }
    doc
}
