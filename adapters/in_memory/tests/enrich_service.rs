//! Sanctions enrichment linking behavior.

mod common;

use async_trait::async_trait;
use casefile_core::prelude::*;
use common::{entity_service, props, seed_entity};
use std::sync::Arc;

struct FixedSanctionsClient {
    adjacent: Vec<String>,
}

#[async_trait]
impl SanctionsClient for FixedSanctionsClient {
    async fn search(
        &self,
        query: &str,
        _limit: usize,
    ) -> Result<SanctionsSearchResponse, EnrichError> {
        Ok(SanctionsSearchResponse {
            query: query.to_string(),
            total: 0,
            results: Vec::new(),
        })
    }

    async fn adjacent_entity_ids(&self, _entity_id: &str) -> Result<Vec<String>, EnrichError> {
        Ok(self.adjacent.clone())
    }
}

#[tokio::test]
async fn linking_connects_only_ids_present_in_the_graph() {
    let (store, entity_service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    seed_entity(&entity_service, &inv, "Q1", "Person", props(&[("name", &["A"])])).await;
    seed_entity(&entity_service, &inv, "Q2", "Person", props(&[("name", &["B"])])).await;

    let client = Arc::new(FixedSanctionsClient {
        adjacent: vec!["Q2".into(), "Q3".into(), "Q4".into()],
    });
    let service = EnrichmentService::new(client, store.clone());

    let response = service.link(&inv, "Q1").await.unwrap();
    assert_eq!(response.linked_to, ["Q2"]);
    assert_eq!(response.links_applied, 1);

    let rows = store
        .graph(&inv)
        .run(GraphStatement::OutgoingEdges { id: "Q1".into() })
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let edge = rows[0][0].as_edge().unwrap();
    assert_eq!(edge.schema, "YENTE_ADJACENT");
    assert_eq!(edge.target, "Q2");
    assert_eq!(edge.properties.values("source"), ["yente"]);
}

#[tokio::test]
async fn linking_twice_is_idempotent() {
    let (store, entity_service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    seed_entity(&entity_service, &inv, "Q1", "Person", PropertyMap::new()).await;
    seed_entity(&entity_service, &inv, "Q2", "Person", PropertyMap::new()).await;

    let client = Arc::new(FixedSanctionsClient {
        adjacent: vec!["Q2".into()],
    });
    let service = EnrichmentService::new(client, store.clone());

    service.link(&inv, "Q1").await.unwrap();
    service.link(&inv, "Q1").await.unwrap();

    let (_, edge_count) = store.stats(&inv);
    assert_eq!(edge_count, 1);
}

#[tokio::test]
async fn empty_adjacency_links_nothing() {
    let (store, entity_service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    seed_entity(&entity_service, &inv, "Q1", "Person", PropertyMap::new()).await;

    let client = Arc::new(FixedSanctionsClient { adjacent: Vec::new() });
    let service = EnrichmentService::new(client, store.clone());

    let response = service.link(&inv, "Q1").await.unwrap();
    assert!(response.linked_to.is_empty());
    assert_eq!(response.links_applied, 0);
    let (_, edge_count) = store.stats(&inv);
    assert_eq!(edge_count, 0);
}
