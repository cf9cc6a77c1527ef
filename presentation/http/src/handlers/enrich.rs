//! Sanctions enrichment routes.

use crate::{bad_request, error_response, ApiError, AppState};
use axum::extract::{Path, Query, State};
use axum::response::Json;
use casefile_core::prelude::*;
use serde::Deserialize;

const MAX_SEARCH_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
    pub limit: Option<usize>,
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SanctionsSearchResponse>, ApiError> {
    if params.query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let limit = params.limit.unwrap_or(20);
    if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
        return Err(bad_request(format!(
            "limit must be between 1 and {MAX_SEARCH_LIMIT}"
        )));
    }

    let response = state
        .enrichment
        .search(&params.query, limit)
        .await
        .map_err(error_response)?;
    Ok(Json(response))
}

pub async fn link(
    State(state): State<AppState>,
    Path((investigation_id, entity_id)): Path<(String, String)>,
) -> Result<Json<LinkResponse>, ApiError> {
    let investigation = InvestigationId::new(investigation_id);
    let response = state
        .enrichment
        .link(&investigation, &entity_id)
        .await
        .map_err(error_response)?;
    Ok(Json(response))
}
