//! Form spec and relation choices handlers.

use crate::error::AppError;
use crate::response;
use crate::service::CrudService;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ChoicesQuery {
    #[serde(default)]
    pub q: Option<String>,
}

impl ChoicesQuery {
    fn search(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

pub async fn create_spec(
    State(state): State<AppState>,
    Path(label): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let model = state.registry.model(&label)?;
    let spec = CrudService::form_spec(&state.pool, &state.registry, model, None).await?;
    Ok(response::spec(spec))
}

pub async fn update_spec(
    State(state): State<AppState>,
    Path((label, lookup)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let model = state.registry.model(&label)?;
    let spec = CrudService::form_spec(&state.pool, &state.registry, model, Some(&lookup)).await?;
    Ok(response::spec(spec))
}

pub async fn choices(
    State(state): State<AppState>,
    Path((label, column)): Path<(String, String)>,
    Query(query): Query<ChoicesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let model = state.registry.model(&label)?;
    let options = CrudService::choices(&state.pool, &state.registry, model, &column, query.search()).await?;
    Ok(Json(options))
}

pub async fn choices_many(
    State(state): State<AppState>,
    Path((label, edge)): Path<(String, String)>,
    Query(query): Query<ChoicesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let model = state.registry.model(&label)?;
    let options = CrudService::choices_many(&state.pool, &state.registry, model, &edge, query.search()).await?;
    Ok(Json(options))
}
