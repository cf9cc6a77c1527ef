//! Casefile server: wires the adapters to the core services and serves the
//! HTTP API.

use axum::http::{header, HeaderValue, Method};
use casefile_adapter_falkordb::{FalkorConfig, FalkorStore};
use casefile_adapter_postgres::{PostgresNotebookStore, PostgresStepStore};
use casefile_adapter_s3::{S3Config, S3ObjectStore};
use casefile_connector_gemini::{GeminiConfig, GeminiExtractor};
use casefile_connector_yente::{YenteClient, YenteConfig};
use casefile_core::prelude::*;
use casefile_http::{build_router, AppState};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::Settings;

#[derive(Error, Debug)]
enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Enrich(#[from] EnrichError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::load()?;
    info!("Starting Casefile server on {}", settings.listen_address);

    // Graph store
    let mut falkor_config = FalkorConfig::new(settings.graph_host.clone(), settings.graph_port);
    if let Some(password) = settings.graph_password.clone() {
        falkor_config = falkor_config.with_password(password);
    }
    let graph_store: Arc<dyn GraphStore> = Arc::new(FalkorStore::new(falkor_config).await?);

    // Relational state: notebooks + workflow durability
    let pool = casefile_adapter_postgres::connect(&settings.database_url).await?;
    casefile_adapter_postgres::ensure_schema(&pool).await?;
    let notebook_store: Arc<dyn NotebookStore> = Arc::new(PostgresNotebookStore::new(pool.clone()));
    let step_store: Arc<dyn StepStore> = Arc::new(PostgresStepStore::new(pool));

    // Object storage
    let object_store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(S3Config {
        endpoint: settings.s3_endpoint.clone(),
        access_key: settings.s3_access_key.clone(),
        secret_key: settings.s3_secret_key.clone(),
        region: settings.s3_region.clone(),
        bucket_prefix: settings.s3_bucket_prefix.clone(),
        secure: settings.s3_secure,
    }));

    // Connectors
    let extractor: Arc<dyn EntityExtractor> = Arc::new(GeminiExtractor::new(
        GeminiConfig::new(settings.gemini_api_key.clone())
            .with_model(settings.extract_model_id.clone()),
    )?);
    let sanctions: Arc<dyn SanctionsClient> = Arc::new(YenteClient::new(YenteConfig {
        base_url: settings.yente_url.clone(),
        dataset: settings.yente_dataset.clone(),
        timeout_seconds: settings.yente_timeout_seconds,
    })?);

    // Core services
    let catalog = Arc::new(SchemaCatalog::new());
    let entities = Arc::new(EntityService::new(graph_store.clone(), catalog.clone()));
    let investigations = Arc::new(InvestigationService::new(graph_store.clone()));
    let ingest = Arc::new(IngestService::new(entities.clone()));
    let workflows = Arc::new(ExtractionWorkflowService::new(
        entities.clone(),
        object_store.clone(),
        extractor,
        step_store,
    ));
    let enrichment = Arc::new(EnrichmentService::new(sanctions, graph_store.clone()));

    // Pick up extraction workflows interrupted by the previous shutdown.
    match workflows.recover().await {
        Ok(0) => {}
        Ok(count) => info!("Recovered {} interrupted extraction workflows", count),
        Err(err) => warn!("Workflow recovery failed: {}", err),
    }

    let state = AppState {
        graph_store,
        object_store,
        notebook_store,
        catalog,
        investigations,
        entities,
        ingest,
        workflows,
        enrichment,
    };

    let router = build_router(state, cors_layer(&settings));
    let listener = tokio::net::TcpListener::bind(&settings.listen_address).await?;
    info!("Casefile listening on {}", settings.listen_address);
    axum::serve(listener, router).await?;
    Ok(())
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_origin_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}
