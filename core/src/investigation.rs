//! Investigation lifecycle: metadata plus the backing graph.

use crate::errors::CoreResult;
use crate::graph::{GraphStatement, GraphStore};
use crate::types::{
    Investigation, InvestigationCreate, InvestigationId, InvestigationList, InvestigationMeta,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const MAX_NAME_LENGTH: usize = 255;

/// Manage investigation metadata and graph lifecycle.
pub struct InvestigationService {
    graph_store: Arc<dyn GraphStore>,
}

impl InvestigationService {
    pub fn new(graph_store: Arc<dyn GraphStore>) -> Self {
        Self { graph_store }
    }

    pub async fn create(&self, payload: InvestigationCreate) -> CoreResult<Investigation> {
        let name = payload.name.trim().to_string();
        if name.is_empty() {
            return Err(crate::errors::CoreError::validation(
                "Investigation name must not be empty",
            ));
        }
        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(crate::errors::CoreError::validation(format!(
                "Investigation name must be at most {MAX_NAME_LENGTH} characters"
            )));
        }

        let meta = InvestigationMeta {
            id: Uuid::new_v4().to_string(),
            name,
            description: payload.description,
            created_at: Utc::now(),
        };
        let investigation = InvestigationId::new(meta.id.clone());

        // Touch the graph so it exists before any entity write.
        self.graph_store.graph(&investigation);
        self.graph_store.put_metadata(&meta).await?;
        info!("Created investigation {} ({})", meta.id, meta.name);

        self.to_investigation(meta).await
    }

    pub async fn list(&self) -> CoreResult<InvestigationList> {
        let metas = self.graph_store.list_metadata().await?;
        let mut items = Vec::with_capacity(metas.len());
        for meta in metas {
            items.push(self.to_investigation(meta).await?);
        }
        let total = items.len();
        Ok(InvestigationList { items, total })
    }

    pub async fn get(&self, id: &str) -> CoreResult<Option<Investigation>> {
        match self.graph_store.get_metadata(id).await? {
            Some(meta) => Ok(Some(self.to_investigation(meta).await?)),
            None => Ok(None),
        }
    }

    /// Remove the metadata record and drop the graph. Returns whether the
    /// investigation existed.
    pub async fn delete(&self, id: &str) -> CoreResult<bool> {
        let existed = self.graph_store.get_metadata(id).await?.is_some();
        self.graph_store.delete_metadata(id).await?;
        self.graph_store
            .delete_graph(&InvestigationId::new(id))
            .await?;
        if existed {
            info!("Deleted investigation {}", id);
        }
        Ok(existed)
    }

    async fn to_investigation(&self, meta: InvestigationMeta) -> CoreResult<Investigation> {
        let graph = self.graph_store.graph(&InvestigationId::new(meta.id.clone()));
        let rows = graph.run(GraphStatement::CountNodes).await?;
        let entity_count = rows
            .first()
            .and_then(|row| row.first())
            .and_then(|value| value.as_integer())
            .unwrap_or(0)
            .max(0) as u64;

        Ok(Investigation {
            id: meta.id,
            name: meta.name,
            description: meta.description,
            created_at: meta.created_at,
            entity_count,
        })
    }
}
