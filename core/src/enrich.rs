//! Sanctions-list enrichment: search passthrough and adjacency linking.

use crate::errors::CoreResult;
use crate::graph::{GraphStatement, GraphStore};
use crate::traits::SanctionsClient;
use crate::types::{InvestigationId, LinkResponse, PropertyMap, SanctionsSearchResponse};
use std::sync::Arc;
use tracing::info;

/// Edge type recorded between an entity and its sanctions-list neighbors.
pub const ADJACENT_RELATION: &str = "YENTE_ADJACENT";

/// Connect graph entities through the external sanctions service.
pub struct EnrichmentService {
    client: Arc<dyn SanctionsClient>,
    graph_store: Arc<dyn GraphStore>,
}

impl EnrichmentService {
    pub fn new(client: Arc<dyn SanctionsClient>, graph_store: Arc<dyn GraphStore>) -> Self {
        Self { client, graph_store }
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> CoreResult<SanctionsSearchResponse> {
        Ok(self.client.search(query, limit).await?)
    }

    /// Fetch the entity's adjacency from the sanctions service, keep the
    /// ids already present in the investigation graph, and record an
    /// adjacency edge towards each of them.
    pub async fn link(
        &self,
        investigation: &InvestigationId,
        entity_id: &str,
    ) -> CoreResult<LinkResponse> {
        let adjacent_ids = self.client.adjacent_entity_ids(entity_id).await?;
        if adjacent_ids.is_empty() {
            return Ok(Self::empty_response(investigation, entity_id));
        }

        let graph = self.graph_store.graph(investigation);
        let rows = graph
            .run(GraphStatement::NodeIdsIn {
                ids: adjacent_ids.clone(),
            })
            .await?;
        let mut existing_ids: Vec<String> = rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|value| value.as_text().map(str::to_string))
            .collect();
        existing_ids.sort();
        existing_ids.dedup();
        if existing_ids.is_empty() {
            return Ok(Self::empty_response(investigation, entity_id));
        }

        let mut links_applied = 0usize;
        for target_id in &existing_ids {
            let mut properties = PropertyMap::new();
            properties.set("source", vec!["yente".to_string()]);
            graph
                .run(GraphStatement::UpsertEdge {
                    // Deterministic id keeps repeated linking idempotent.
                    id: format!("yente-{entity_id}-{target_id}"),
                    schema: ADJACENT_RELATION.to_string(),
                    source: entity_id.to_string(),
                    target: target_id.clone(),
                    properties,
                })
                .await?;
            links_applied += 1;
        }

        info!(
            "Linked {} to {} adjacent entities in {}",
            entity_id, links_applied, investigation
        );
        Ok(LinkResponse {
            investigation_id: investigation.to_string(),
            entity_id: entity_id.to_string(),
            linked_to: existing_ids,
            links_applied,
        })
    }

    fn empty_response(investigation: &InvestigationId, entity_id: &str) -> LinkResponse {
        LinkResponse {
            investigation_id: investigation.to_string(),
            entity_id: entity_id.to_string(),
            linked_to: Vec::new(),
            links_applied: 0,
        }
    }
}
