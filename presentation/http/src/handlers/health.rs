//! Health check endpoint.

use crate::AppState;
use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub graph: &'static str,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthReport> {
    match state.graph_store.health_check().await {
        Ok(()) => Json(HealthReport {
            status: "healthy",
            graph: "ok",
        }),
        Err(_) => Json(HealthReport {
            status: "degraded",
            graph: "unavailable",
        }),
    }
}
