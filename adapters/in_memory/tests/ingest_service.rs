//! FTM record ingestion behavior.

mod common;

use casefile_core::prelude::*;
use common::{entity_service, props, seed_entity};
use serde_json::json;
use std::sync::Arc;

async fn seeded_ingest() -> (
    Arc<casefile_adapter_in_memory::InMemoryGraphStore>,
    IngestService,
    InvestigationId,
) {
    let (store, entity_service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    seed_entity(
        &entity_service,
        &inv,
        "person-1",
        "Person",
        props(&[("name", &["John Doe"])]),
    )
    .await;
    seed_entity(
        &entity_service,
        &inv,
        "company-1",
        "Company",
        props(&[("name", &["Acme Corp"])]),
    )
    .await;
    (store, IngestService::new(entity_service), inv)
}

#[tokio::test]
async fn employment_aliases_resolve_against_names() {
    let (store, service, inv) = seeded_ingest().await;

    let records = vec![json!({
        "id": "rel-1",
        "schema": "Employment",
        "properties": {
            "person": ["John Doe"],
            "organization": ["Acme Corp"],
            "role": ["CEO"],
            "startDate": ["2021-07"],
            "confidence": ["0.93"],
        },
    })];

    let result = service.ingest_records(&inv, records).await.unwrap();
    assert_eq!(result.edges_created, 1);
    assert_eq!(result.nodes_created, 0);
    assert!(result.errors.is_empty());

    let graph = store.graph(&inv);
    let rows = graph
        .run(GraphStatement::OutgoingEdges {
            id: "person-1".into(),
        })
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let edge = rows[0][0].as_edge().unwrap();
    assert_eq!(edge.schema, "Employment");
    assert_eq!(edge.source, "person-1");
    assert_eq!(edge.target, "company-1");
    assert_eq!(edge.properties.values("employee"), ["person-1"]);
    assert_eq!(edge.properties.values("employer"), ["company-1"]);
    assert_eq!(edge.properties.values("role"), ["CEO"]);
}

#[tokio::test]
async fn unresolved_relation_endpoints_are_reported() {
    let (store, service, inv) = seeded_ingest().await;

    let records = vec![json!({
        "id": "rel-2",
        "schema": "Ownership",
        "properties": {
            "owner": ["Unknown Owner"],
            "asset": ["Missing Asset"],
        },
    })];

    let result = service.ingest_records(&inv, records).await.unwrap();
    assert_eq!(result.edges_created, 0);
    assert!(result
        .errors
        .iter()
        .any(|msg| msg.contains("unresolved relation endpoints")));
    let (_, edge_count) = store.stats(&inv);
    assert_eq!(edge_count, 0);
}

#[tokio::test]
async fn mixed_ndjson_batch_creates_nodes_then_edges() {
    let (store, service, inv) = seeded_ingest().await;

    let ndjson = concat!(
        "{\"id\": \"exec-1\", \"schema\": \"Person\", \"properties\": {\"name\": [\"Andy Jassy\"]}}\n",
        "{\"id\": \"amzn\", \"schema\": \"Company\", \"properties\": {\"name\": [\"Amazon.com\"], \"ticker\": [\"AMZN\"]}}\n",
        "{\"id\": \"rel-emp\", \"schema\": \"Employment\", \"properties\": {\"employee\": [\"Andy Jassy\"], \"employer\": [\"Amazon.com\"], \"role\": [\"CEO\"]}}\n",
        "{\"id\": \"rel-own\", \"schema\": \"Ownership\", \"properties\": {\"owner\": [\"John Doe\"], \"asset\": [\"amzn\"], \"percentage\": [\"9.8%\"]}}\n",
    );

    let result = service
        .ingest_file(&inv, "batch.ndjson", ndjson.as_bytes())
        .await
        .unwrap();
    assert_eq!(result.processed, 4);
    assert_eq!(result.nodes_created, 2);
    assert_eq!(result.edges_created, 2);
    assert!(result.errors.is_empty());

    let graph = store.graph(&inv);
    let rows = graph
        .run(GraphStatement::OutgoingEdges { id: "john".into() })
        .await
        .unwrap();
    assert!(rows.is_empty());

    let rows = graph
        .run(GraphStatement::OutgoingEdges {
            id: "person-1".into(),
        })
        .await
        .unwrap();
    let edge = rows[0][0].as_edge().unwrap();
    assert_eq!(edge.schema, "Ownership");
    // the percentage was cleaned on the way in
    assert_eq!(edge.properties.values("percentage"), ["9.8"]);
}

#[tokio::test]
async fn missing_schema_and_bad_properties_are_per_record_errors() {
    let (_, service, inv) = seeded_ingest().await;

    let records = vec![
        json!({"properties": {"name": ["No Schema"]}}),
        json!({"schema": "  ", "properties": {}}),
        json!({"schema": "Person", "properties": "nope"}),
        json!({"schema": "Person", "properties": {"name": ["Fine Person"]}}),
    ];

    let result = service.ingest_records(&inv, records).await.unwrap();
    assert_eq!(result.processed, 4);
    assert_eq!(result.nodes_created, 1);
    assert_eq!(result.errors.len(), 3);
    assert!(result.errors[0].contains("Record 1: missing schema"));
    assert!(result.errors[1].contains("Record 2: missing schema"));
    assert!(result.errors[2].contains("Record 3: invalid properties"));
}

#[tokio::test]
async fn reingesting_a_node_with_known_id_updates_it() {
    let (_, service, inv) = seeded_ingest().await;

    let records = vec![json!({
        "id": "person-1",
        "schema": "Person",
        "properties": {"name": ["John Doe"], "nationality": ["US"]},
    })];

    let result = service.ingest_records(&inv, records).await.unwrap();
    assert_eq!(result.nodes_created, 0);
    assert!(result.errors.is_empty());

    let entity = service
        .entity_service()
        .get(&inv, "person-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entity.properties.values("nationality"), ["us"]);
}

#[tokio::test]
async fn endpoint_references_resolve_by_id_before_name() {
    let (store, service, inv) = seeded_ingest().await;

    let records = vec![json!({
        "id": "rel-3",
        "schema": "Directorship",
        "properties": {
            "director": ["person-1"],
            "organization": ["company-1"],
        },
    })];

    let result = service.ingest_records(&inv, records).await.unwrap();
    assert_eq!(result.edges_created, 1);

    let graph = store.graph(&inv);
    let rows = graph
        .run(GraphStatement::OutgoingEdges {
            id: "person-1".into(),
        })
        .await
        .unwrap();
    let edge = rows[0][0].as_edge().unwrap();
    assert_eq!(edge.schema, "Directorship");
    assert_eq!(edge.properties.values("director"), ["person-1"]);
}

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let (_, service, inv) = seeded_ingest().await;
    let err = service
        .ingest_file(&inv, "data.csv", b"a,b,c")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert!(err.to_string().contains("Unsupported file extension"));
}

#[tokio::test]
async fn relation_upsert_collapses_on_record_id() {
    let (store, service, inv) = seeded_ingest().await;

    let record = json!({
        "id": "rel-1",
        "schema": "Employment",
        "properties": {
            "employee": ["John Doe"],
            "employer": ["Acme Corp"],
        },
    });

    service
        .ingest_records(&inv, vec![record.clone()])
        .await
        .unwrap();
    service.ingest_records(&inv, vec![record]).await.unwrap();

    let (_, edge_count) = store.stats(&inv);
    assert_eq!(edge_count, 1);
}
