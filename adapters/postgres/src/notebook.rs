//! Notebook persistence with optimistic concurrency.

use async_trait::async_trait;
use casefile_core::prelude::*;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

const SELECT_NOTEBOOK: &str = "SELECT investigation_id, canvas_doc, version, created_at, \
     updated_at FROM investigation_notebooks WHERE investigation_id = $1";

pub struct PostgresNotebookStore {
    pool: PgPool,
}

impl PostgresNotebookStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_document(row: &PgRow) -> Result<NotebookDocument, NotebookError> {
        let canvas: sqlx::types::Json<NotebookCanvas> = row
            .try_get("canvas_doc")
            .map_err(|err| NotebookError::Store(err.to_string()))?;
        Ok(NotebookDocument {
            investigation_id: column(row, "investigation_id")?,
            version: column(row, "version")?,
            canvas_doc: canvas.0,
            created_at: column::<DateTime<Utc>>(row, "created_at")?,
            updated_at: column::<DateTime<Utc>>(row, "updated_at")?,
        })
    }

    /// Single idempotent insert of the default canvas, followed by a
    /// re-select so concurrent creators all read the same row.
    async fn create_default(
        &self,
        investigation: &InvestigationId,
    ) -> Result<NotebookDocument, NotebookError> {
        sqlx::query(
            "INSERT INTO investigation_notebooks \
             (id, investigation_id, canvas_doc, version) \
             VALUES ($1, $2, $3, 1) \
             ON CONFLICT (investigation_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(investigation.as_str())
        .bind(sqlx::types::Json(NotebookCanvas::default()))
        .execute(&self.pool)
        .await
        .map_err(|err| NotebookError::Store(err.to_string()))?;

        let row = sqlx::query(SELECT_NOTEBOOK)
            .bind(investigation.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| NotebookError::Store(err.to_string()))?
            .ok_or_else(|| NotebookError::Store("Unable to create notebook".to_string()))?;
        Self::row_to_document(&row)
    }

    async fn try_save(
        &self,
        investigation: &InvestigationId,
        expected_version: i32,
        canvas_doc: &NotebookCanvas,
    ) -> Result<Option<NotebookDocument>, NotebookError> {
        let row = sqlx::query(
            "UPDATE investigation_notebooks \
             SET canvas_doc = $3, version = version + 1, updated_at = NOW() \
             WHERE investigation_id = $1 AND version = $2 \
             RETURNING investigation_id, canvas_doc, version, created_at, updated_at",
        )
        .bind(investigation.as_str())
        .bind(expected_version)
        .bind(sqlx::types::Json(canvas_doc.clone()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| NotebookError::Store(err.to_string()))?;
        row.map(|row| Self::row_to_document(&row)).transpose()
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, NotebookError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|err| NotebookError::Store(err.to_string()))
}

#[async_trait]
impl NotebookStore for PostgresNotebookStore {
    async fn get_or_create(
        &self,
        investigation: &InvestigationId,
    ) -> Result<NotebookDocument, NotebookError> {
        let row = sqlx::query(SELECT_NOTEBOOK)
            .bind(investigation.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| NotebookError::Store(err.to_string()))?;
        match row {
            Some(row) => Self::row_to_document(&row),
            None => self.create_default(investigation).await,
        }
    }

    async fn save(
        &self,
        investigation: &InvestigationId,
        expected_version: i32,
        canvas_doc: NotebookCanvas,
    ) -> Result<NotebookDocument, NotebookError> {
        if let Some(saved) = self
            .try_save(investigation, expected_version, &canvas_doc)
            .await?
        {
            debug!(
                "Notebook for {} now at version {}",
                investigation, saved.version
            );
            return Ok(saved);
        }

        // No row matched: either the notebook does not exist yet, or the
        // caller lost the version race.
        let existing = sqlx::query(SELECT_NOTEBOOK)
            .bind(investigation.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| NotebookError::Store(err.to_string()))?;
        if existing.is_some() {
            return Err(NotebookError::Conflict);
        }

        let created = self.create_default(investigation).await?;
        if created.version != expected_version {
            return Err(NotebookError::Conflict);
        }
        self.try_save(investigation, expected_version, &canvas_doc)
            .await?
            .ok_or(NotebookError::Conflict)
    }
}
