//! Investigation CRUD routes.

use crate::{error_response, not_found, ApiError, AppState};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use casefile_core::prelude::*;

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<InvestigationCreate>,
) -> Result<(StatusCode, Json<Investigation>), ApiError> {
    let investigation = state
        .investigations
        .create(payload)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(investigation)))
}

pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<InvestigationList>, ApiError> {
    let list = state.investigations.list().await.map_err(error_response)?;
    Ok(Json(list))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(investigation_id): Path<String>,
) -> Result<Json<Investigation>, ApiError> {
    state
        .investigations
        .get(&investigation_id)
        .await
        .map_err(error_response)?
        .map(Json)
        .ok_or_else(|| not_found("Investigation not found"))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(investigation_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .investigations
        .delete(&investigation_id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}
