//! Entity CRUD, expansion, deduplication and merge routes.

use crate::{bad_request, error_response, not_found, ApiError, AppState};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use casefile_core::prelude::*;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DuplicateParams {
    pub schema: Option<String>,
    pub threshold: Option<f64>,
    pub limit: Option<usize>,
}

pub async fn create(
    State(state): State<AppState>,
    Path(investigation_id): Path<String>,
    Json(payload): Json<EntityCreate>,
) -> Result<(StatusCode, Json<Entity>), ApiError> {
    let investigation = InvestigationId::new(investigation_id);
    let entity = state
        .entities
        .create(&investigation, payload)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(entity)))
}

pub async fn list(
    State(state): State<AppState>,
    Path(investigation_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Entity>>, ApiError> {
    let investigation = InvestigationId::new(investigation_id);
    let entities = state
        .entities
        .list(&investigation, params.search.as_deref())
        .await
        .map_err(error_response)?;
    Ok(Json(entities))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path((investigation_id, entity_id)): Path<(String, String)>,
) -> Result<Json<Entity>, ApiError> {
    let investigation = InvestigationId::new(investigation_id);
    state
        .entities
        .get(&investigation, &entity_id)
        .await
        .map_err(error_response)?
        .map(Json)
        .ok_or_else(|| not_found("Entity not found"))
}

pub async fn update(
    State(state): State<AppState>,
    Path((investigation_id, entity_id)): Path<(String, String)>,
    Json(payload): Json<EntityUpdate>,
) -> Result<Json<Entity>, ApiError> {
    let investigation = InvestigationId::new(investigation_id);
    state
        .entities
        .update(&investigation, &entity_id, payload)
        .await
        .map_err(error_response)?
        .map(Json)
        .ok_or_else(|| not_found("Entity not found"))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((investigation_id, entity_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let investigation = InvestigationId::new(investigation_id);
    let deleted = state
        .entities
        .delete(&investigation, &entity_id)
        .await
        .map_err(error_response)?;
    if !deleted {
        return Err(not_found("Entity not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn expand(
    State(state): State<AppState>,
    Path((investigation_id, entity_id)): Path<(String, String)>,
) -> Result<Json<EntityExpand>, ApiError> {
    let investigation = InvestigationId::new(investigation_id);
    state
        .entities
        .expand(&investigation, &entity_id)
        .await
        .map_err(error_response)?
        .map(Json)
        .ok_or_else(|| not_found("Entity not found"))
}

pub async fn find_duplicates(
    State(state): State<AppState>,
    Path(investigation_id): Path<String>,
    Query(params): Query<DuplicateParams>,
) -> Result<Json<Vec<DuplicateCandidate>>, ApiError> {
    let threshold = params.threshold.unwrap_or(0.7);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(bad_request("threshold must be between 0.0 and 1.0"));
    }
    let limit = params.limit.unwrap_or(100);
    if !(1..=500).contains(&limit) {
        return Err(bad_request("limit must be between 1 and 500"));
    }

    let investigation = InvestigationId::new(investigation_id);
    let candidates = state
        .entities
        .find_duplicates(&investigation, params.schema.as_deref(), threshold, limit)
        .await
        .map_err(error_response)?;
    Ok(Json(candidates))
}

pub async fn merge(
    State(state): State<AppState>,
    Path(investigation_id): Path<String>,
    Json(payload): Json<MergeRequest>,
) -> Result<Json<MergeResponse>, ApiError> {
    let investigation = InvestigationId::new(investigation_id);
    let response = state
        .entities
        .merge(&investigation, payload)
        .await
        .map_err(error_response)?;
    Ok(Json(response))
}
