//! Entity CRUD handlers: list, create, read, update, partial_update, delete.

use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::response;
use crate::service::{decode_write, CrudService, WriteMode};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;

fn parse_id(id_str: &str) -> Result<i64, AppError> {
    id_str
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid id: {}", id_str)))
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    body.map(|Json(v)| v).map_err(|rejection| match rejection {
        JsonRejection::MissingJsonContentType(r) => AppError::UnsupportedMediaType(r.body_text()),
        other => AppError::BadRequest(other.body_text()),
    })
}

/// Entity behind a path segment, provided `operation` is enabled for it.
fn entity_for<'a>(
    state: &'a AppState,
    path_segment: &str,
    operation: &str,
) -> Result<&'a ResolvedEntity, AppError> {
    let entity = state
        .model
        .entity_by_path(path_segment)
        .ok_or_else(|| AppError::NotFound(path_segment.to_string()))?;
    if !entity.allows(operation) {
        return Err(AppError::BadRequest(format!("{} not allowed", operation)));
    }
    Ok(entity)
}

fn item_not_found(path_segment: &str, id: i64) -> AppError {
    AppError::NotFound(format!("{}/{}", path_segment, id))
}

pub async fn list(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "read")?;
    let rows = CrudService::list(&state.pool, entity).await?;
    Ok(response::many(rows))
}

pub async fn create(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "create")?;
    let values = decode_write(entity, json_body(body)?, WriteMode::Create)?;
    let row = CrudService::create(&state.pool, entity, &values).await?;
    Ok(response::created(row))
}

pub async fn read(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "read")?;
    let id = parse_id(&id_str)?;
    let row = CrudService::read(&state.pool, entity, id)
        .await?
        .ok_or_else(|| item_not_found(&path_segment, id))?;
    Ok(response::ok(row))
}

/// PUT: full replacement; required fields must be present.
pub async fn update(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    write_item(state, path_segment, id_str, body, WriteMode::Replace).await
}

/// PATCH: only the fields sent are decoded and written.
pub async fn partial_update(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    write_item(state, path_segment, id_str, body, WriteMode::Partial).await
}

async fn write_item(
    state: AppState,
    path_segment: String,
    id_str: String,
    body: Result<Json<Value>, JsonRejection>,
    mode: WriteMode,
) -> Result<(StatusCode, Json<response::SuccessOne<Value>>), AppError> {
    let entity = entity_for(&state, &path_segment, "update")?;
    let id = parse_id(&id_str)?;
    let values = decode_write(entity, json_body(body)?, mode)?;
    let row = CrudService::update(&state.pool, entity, id, &values)
        .await?
        .ok_or_else(|| item_not_found(&path_segment, id))?;
    Ok(response::ok(row))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "delete")?;
    let id = parse_id(&id_str)?;
    if !CrudService::delete(&state.pool, entity, id).await? {
        return Err(item_not_found(&path_segment, id));
    }
    Ok(StatusCode::NO_CONTENT)
}
