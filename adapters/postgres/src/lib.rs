//! PostgreSQL persistence for Casefile.
//!
//! Two concerns live here: investigation notebooks (a JSONB document per
//! investigation with optimistic version CAS) and the durable state of the
//! extraction workflow executor (workflow rows plus step outputs keyed by
//! `(workflow_id, step_name)`).

mod notebook;
mod workflow;

pub use notebook::PostgresNotebookStore;
pub use workflow::PostgresStepStore;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Open a connection pool against the configured database.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    info!("Connecting to PostgreSQL");
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Create every table this adapter relies on. Idempotent.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS investigation_notebooks (
            id UUID PRIMARY KEY,
            investigation_id TEXT NOT NULL UNIQUE,
            canvas_doc JSONB NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS extraction_workflows (
            workflow_id TEXT PRIMARY KEY,
            request JSONB NOT NULL,
            status TEXT NOT NULL,
            result JSONB,
            error TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS extraction_workflow_steps (
            workflow_id TEXT NOT NULL,
            step_name TEXT NOT NULL,
            output JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (workflow_id, step_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
