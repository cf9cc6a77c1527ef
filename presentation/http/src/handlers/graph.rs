//! Graph retrieval routes.

use crate::{bad_request, error_response, ApiError, AppState};
use axum::extract::{Path, Query, State};
use axum::response::Json;
use casefile_core::prelude::*;
use serde::Deserialize;

const MAX_PAGE_LIMIT: usize = 2000;
const DEFAULT_PAGE_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

pub async fn get_graph(
    State(state): State<AppState>,
    Path(investigation_id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<GraphPage>, ApiError> {
    let skip = params.skip.unwrap_or(0);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(bad_request(format!(
            "limit must be between 1 and {MAX_PAGE_LIMIT}"
        )));
    }

    let investigation = InvestigationId::new(investigation_id);
    let page = state
        .entities
        .graph_page(&investigation, skip, limit)
        .await
        .map_err(error_response)?;
    Ok(Json(page))
}
