//! Schema catalog routes.

use crate::{not_found, ApiError, AppState};
use axum::extract::{Path, State};
use axum::response::Json;
use casefile_core::prelude::*;

pub async fn list_schemata(State(state): State<AppState>) -> Json<Vec<SchemaInfo>> {
    Json(state.catalog.list())
}

pub async fn get_schema(
    State(state): State<AppState>,
    Path(schema_name): Path<String>,
) -> Result<Json<SchemaDetail>, ApiError> {
    state
        .catalog
        .get(&schema_name)
        .map(Json)
        .ok_or_else(|| not_found(format!("Schema '{schema_name}' not found")))
}
