//! HTTP presentation layer for Casefile.
//!
//! One axum router over the core services: investigations, entities,
//! ingestion, graph pages, notebooks, the schema catalog and sanctions
//! enrichment. Authentication is a deployment concern handled in front of
//! this router; every route here assumes an already-authenticated caller.

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use casefile_core::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

mod handlers;

/// Application state shared across handlers. Service instances are
/// constructed once and shared by reference; all of them are re-entrant.
#[derive(Clone)]
pub struct AppState {
    pub graph_store: Arc<dyn GraphStore>,
    pub object_store: Arc<dyn ObjectStore>,
    pub notebook_store: Arc<dyn NotebookStore>,
    pub catalog: Arc<SchemaCatalog>,
    pub investigations: Arc<InvestigationService>,
    pub entities: Arc<EntityService>,
    pub ingest: Arc<IngestService>,
    pub workflows: Arc<ExtractionWorkflowService>,
    pub enrichment: Arc<EnrichmentService>,
}

/// Build the full API router for the given state.
pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/api/investigations",
            post(handlers::investigations::create).get(handlers::investigations::list),
        )
        .route(
            "/api/investigations/:investigation_id",
            get(handlers::investigations::get_one).delete(handlers::investigations::delete),
        )
        .route(
            "/api/investigations/:investigation_id/entities",
            post(handlers::entities::create).get(handlers::entities::list),
        )
        .route(
            "/api/investigations/:investigation_id/entities/merge",
            post(handlers::entities::merge),
        )
        .route(
            "/api/investigations/:investigation_id/entities/deduplicate/candidates",
            get(handlers::entities::find_duplicates),
        )
        .route(
            "/api/investigations/:investigation_id/entities/:entity_id",
            get(handlers::entities::get_one)
                .put(handlers::entities::update)
                .delete(handlers::entities::delete),
        )
        .route(
            "/api/investigations/:investigation_id/entities/:entity_id/expand",
            get(handlers::entities::expand),
        )
        .route(
            "/api/investigations/:investigation_id/ingest",
            post(handlers::ingest::ingest_file),
        )
        .route(
            "/api/investigations/:investigation_id/ingest/:workflow_id/status",
            get(handlers::ingest::extraction_status),
        )
        .route(
            "/api/investigations/:investigation_id/graph",
            get(handlers::graph::get_graph),
        )
        .route(
            "/api/investigations/:investigation_id/notebook",
            get(handlers::notebook::get_notebook).put(handlers::notebook::update_notebook),
        )
        .route("/api/schema", get(handlers::schema::list_schemata))
        .route("/api/schema/:schema_name", get(handlers::schema::get_schema))
        .route("/api/enrich/yente", get(handlers::enrich::search))
        .route(
            "/api/enrich/yente/link/:investigation_id/:entity_id",
            post(handlers::enrich::link),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Uploads above this size are rejected before they reach a handler.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Error payload, FastAPI-style: a single `detail` string.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

/// Map the core taxonomy onto HTTP status codes.
pub fn error_response(err: CoreError) -> ApiError {
    let status = match &err {
        CoreError::Validation(_) | CoreError::Schema(_) => StatusCode::BAD_REQUEST,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("API error: {} - {}", status, err);
    }
    (
        status,
        Json(ErrorBody {
            detail: err.to_string(),
        }),
    )
}

pub(crate) fn bad_request(detail: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
}

pub(crate) fn not_found(detail: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
}
