//! HTTP request handlers
//!
//! Thin adapters: extract the role and parameters, call the engine, wrap the
//! result. All decisions live in `morph`.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use morph::crud::MutationOutcome;
use morph::{CrudRequest, CrudResponse, SyncReport};
use morph_api::{
    ApiError, CrudAction, Document, EntityTypeDefinition, FieldDescriptor, ReadQuery, ReadResult,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::HttpError;
use crate::state::AppState;

pub type HandlerResult<T> = Result<T, HttpError>;

#[derive(Debug, Deserialize)]
pub struct DefineSchema {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Deserialize)]
pub struct RedefineSchema {
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameSchema {
    pub new_name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub id: String,
}

/// Response body of create, update and delete.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationBody {
    pub data: Document,
    pub relation_sync: SyncReport,
}

impl From<MutationOutcome> for MutationBody {
    fn from(outcome: MutationOutcome) -> Self {
        if !outcome.sync.is_clean() {
            warn!(
                "[handlers] {} reverse-relation update(s) failed",
                outcome.sync.failures.len()
            );
        }
        Self {
            data: outcome.document,
            relation_sync: outcome.sync,
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
    action: CrudAction,
    entity: &str,
) -> Result<(), ApiError> {
    let role = state.role(headers);
    if role == state.admin_role {
        return Ok(());
    }
    warn!("[handlers] Schema {} on '{}' denied for role '{}'", action, entity, role);
    Err(ApiError::AuthorizationDenied {
        role,
        action,
        entity: entity.to_string(),
    })
}

pub async fn list_schemas(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> HandlerResult<Json<Vec<EntityTypeDefinition>>> {
    require_admin(&state, &headers, CrudAction::Read, "schemas")?;
    Ok(Json(state.platform.schemas.list().await?))
}

pub async fn define_schema(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DefineSchema>,
) -> HandlerResult<(StatusCode, Json<EntityTypeDefinition>)> {
    require_admin(&state, &headers, CrudAction::Create, &body.name)?;
    let definition = state.platform.schemas.define(&body.name, body.fields).await?;
    Ok((StatusCode::CREATED, Json(definition)))
}

pub async fn get_schema(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> HandlerResult<Json<EntityTypeDefinition>> {
    require_admin(&state, &headers, CrudAction::Read, &name)?;
    Ok(Json(state.platform.schemas.get(&name).await?))
}

pub async fn redefine_schema(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RedefineSchema>,
) -> HandlerResult<Json<EntityTypeDefinition>> {
    require_admin(&state, &headers, CrudAction::Update, &name)?;
    Ok(Json(state.platform.schemas.redefine(&name, body.fields).await?))
}

pub async fn remove_schema(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> HandlerResult<Json<EntityTypeDefinition>> {
    require_admin(&state, &headers, CrudAction::Delete, &name)?;
    Ok(Json(state.platform.schemas.remove(&name).await?))
}

pub async fn rename_schema(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RenameSchema>,
) -> HandlerResult<Json<EntityTypeDefinition>> {
    require_admin(&state, &headers, CrudAction::Update, &name)?;
    Ok(Json(state.platform.schemas.rename(&name, &body.new_name).await?))
}

/// Every entity request goes through the executor's single instrumented entry point.
async fn execute(
    state: &AppState,
    role: &str,
    request: CrudRequest,
) -> Result<CrudResponse, ApiError> {
    state.platform.executor.execute(role, request).await
}

fn mismatched(entity: &str) -> ApiError {
    ApiError::Internal {
        message: format!("unexpected response kind for '{}'", entity),
    }
}

async fn mutate(
    state: &AppState,
    role: &str,
    request: CrudRequest,
) -> Result<MutationBody, ApiError> {
    let entity = request.entity().to_string();
    execute(state, role, request)
        .await?
        .into_mutation()
        .map(MutationBody::from)
        .ok_or_else(|| mismatched(&entity))
}

pub async fn read_entities(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Query(query): Query<ReadQuery>,
) -> HandlerResult<Json<ReadResult>> {
    let role = state.role(&headers);
    debug!("[handlers] GET {} as '{}': {:?}", entity, role, query);
    let request = CrudRequest::Read {
        entity: entity.clone(),
        query,
    };
    let result = execute(&state, &role, request)
        .await?
        .into_read()
        .ok_or_else(|| mismatched(&entity))?;
    Ok(Json(result))
}

pub async fn create_entity(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Document>,
) -> HandlerResult<(StatusCode, Json<MutationBody>)> {
    let role = state.role(&headers);
    let body = mutate(&state, &role, CrudRequest::Create { entity, payload }).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

pub async fn update_entity(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Document>,
) -> HandlerResult<Json<MutationBody>> {
    let role = state.role(&headers);
    Ok(Json(mutate(&state, &role, CrudRequest::Update { entity, payload }).await?))
}

pub async fn delete_entity(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Query(params): Query<DeleteParams>,
) -> HandlerResult<Json<MutationBody>> {
    let role = state.role(&headers);
    let request = CrudRequest::Delete {
        entity,
        id: params.id,
    };
    Ok(Json(mutate(&state, &role, request).await?))
}
