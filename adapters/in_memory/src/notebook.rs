//! In-memory notebook store with the same CAS contract as Postgres.

use async_trait::async_trait;
use casefile_core::prelude::*;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct InMemoryNotebookStore {
    notebooks: Arc<Mutex<HashMap<String, NotebookDocument>>>,
}

impl InMemoryNotebookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotebookStore for InMemoryNotebookStore {
    async fn get_or_create(
        &self,
        investigation: &InvestigationId,
    ) -> Result<NotebookDocument, NotebookError> {
        let mut notebooks = self
            .notebooks
            .lock()
            .map_err(|_| NotebookError::Store("notebook state poisoned".into()))?;
        let entry = notebooks
            .entry(investigation.to_string())
            .or_insert_with(|| {
                let now = Utc::now();
                NotebookDocument {
                    investigation_id: investigation.to_string(),
                    version: 1,
                    canvas_doc: NotebookCanvas::default(),
                    created_at: now,
                    updated_at: now,
                }
            });
        Ok(entry.clone())
    }

    async fn save(
        &self,
        investigation: &InvestigationId,
        expected_version: i32,
        canvas_doc: NotebookCanvas,
    ) -> Result<NotebookDocument, NotebookError> {
        let mut notebooks = self
            .notebooks
            .lock()
            .map_err(|_| NotebookError::Store("notebook state poisoned".into()))?;

        let key = investigation.to_string();
        let entry = match notebooks.get_mut(&key) {
            Some(entry) => entry,
            None => {
                // Saving against a notebook that was never fetched: create
                // the default row first, then apply the CAS against it.
                let now = Utc::now();
                notebooks.insert(
                    key.clone(),
                    NotebookDocument {
                        investigation_id: key.clone(),
                        version: 1,
                        canvas_doc: NotebookCanvas::default(),
                        created_at: now,
                        updated_at: now,
                    },
                );
                notebooks
                    .get_mut(&key)
                    .ok_or_else(|| NotebookError::Store("notebook vanished".into()))?
            }
        };

        if entry.version != expected_version {
            return Err(NotebookError::Conflict);
        }
        entry.version += 1;
        entry.canvas_doc = canvas_doc;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }
}
