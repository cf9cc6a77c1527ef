//! Investigation notebook routes.

use crate::{error_response, ApiError, AppState};
use axum::extract::{Path, State};
use axum::response::Json;
use casefile_core::prelude::*;

pub async fn get_notebook(
    State(state): State<AppState>,
    Path(investigation_id): Path<String>,
) -> Result<Json<NotebookDocument>, ApiError> {
    let investigation = InvestigationId::new(investigation_id);
    let notebook = state
        .notebook_store
        .get_or_create(&investigation)
        .await
        .map_err(|err| error_response(err.into()))?;
    Ok(Json(notebook))
}

pub async fn update_notebook(
    State(state): State<AppState>,
    Path(investigation_id): Path<String>,
    Json(payload): Json<NotebookUpdate>,
) -> Result<Json<NotebookDocument>, ApiError> {
    let investigation = InvestigationId::new(investigation_id);
    let notebook = state
        .notebook_store
        .save(&investigation, payload.version, payload.canvas_doc)
        .await
        .map_err(|err| error_response(err.into()))?;
    Ok(Json(notebook))
}
