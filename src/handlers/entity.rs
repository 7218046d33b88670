//! Model CRUD handlers: list, create, read, update, delete, bulk.

use crate::error::AppError;
use crate::response;
use crate::service::{BulkAction, BulkRequest, CrudService};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

pub async fn list(
    State(state): State<AppState>,
    Path(label): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let model = state.registry.model(&label)?;
    let body = CrudService::list(&state.pool, &state.registry, model, &params).await?;
    Ok(Json(body))
}

pub async fn create(
    State(state): State<AppState>,
    Path(label): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let model = state.registry.model(&label)?;
    let row = CrudService::create(&state.pool, &state.registry, model, body).await?;
    Ok(response::mutation(
        StatusCode::CREATED,
        format!("{} record created", model.label),
        Some(row),
    ))
}

pub async fn read(
    State(state): State<AppState>,
    Path((label, lookup)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let model = state.registry.model(&label)?;
    let row = CrudService::read(&state.pool, model, &lookup).await?;
    Ok(response::data(row))
}

/// Shared by POST, PATCH and PUT.
pub async fn update(
    State(state): State<AppState>,
    Path((label, lookup)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let model = state.registry.model(&label)?;
    let row = CrudService::update(&state.pool, &state.registry, model, &lookup, body).await?;
    Ok(response::mutation(
        StatusCode::OK,
        format!("{} record updated", model.label),
        Some(row),
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((label, lookup)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let model = state.registry.model(&label)?;
    CrudService::delete(&state.pool, model, &lookup).await?;
    Ok(response::mutation::<Value>(
        StatusCode::OK,
        format!("{} record deleted", model.label),
        None,
    ))
}

pub async fn bulk(
    State(state): State<AppState>,
    Path(action): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let action = BulkAction::parse(&action)?;
    let request: BulkRequest =
        serde_json::from_value(body).map_err(|e| AppError::BadRequest(format!("invalid bulk request: {}", e)))?;
    let affected = CrudService::bulk(&state.pool, &state.registry, action, &request).await?;
    Ok(response::mutation(
        StatusCode::OK,
        format!("{} {} record(s) deleted", affected, request.model_label),
        Some(serde_json::json!({ "count": affected })),
    ))
}
