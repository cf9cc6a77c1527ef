//! Entity service behavior against the in-memory graph.

mod common;

use casefile_core::prelude::*;
use common::{entity_service, props, seed_entity};

#[tokio::test]
async fn created_properties_round_trip() {
    let (_, service) = entity_service();
    let inv = InvestigationId::new("inv-1");

    let created = service
        .create(
            &inv,
            EntityCreate {
                id: None,
                schema: "Person".into(),
                properties: props(&[
                    ("name", &["Jane Doe", "J. Doe"]),
                    ("birthDate", &["1980-02-01"]),
                    ("country", &["fr"]),
                ]),
            },
        )
        .await
        .unwrap();

    let fetched = service.get(&inv, &created.id).await.unwrap().unwrap();
    assert_eq!(fetched.schema, "Person");
    assert_eq!(fetched.properties.values("name"), ["Jane Doe", "J. Doe"]);
    assert_eq!(fetched.properties.values("birthDate"), ["1980-02-01"]);
    assert_eq!(fetched.properties.values("country"), ["fr"]);
}

#[tokio::test]
async fn create_rejects_duplicate_ids() {
    let (_, service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    seed_entity(&service, &inv, "p1", "Person", props(&[("name", &["A"])])).await;

    let err = service
        .create(
            &inv,
            EntityCreate {
                id: Some("p1".into()),
                schema: "Person".into(),
                properties: PropertyMap::new(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn create_rejects_schema_violations() {
    let (_, service) = entity_service();
    let inv = InvestigationId::new("inv-1");

    let err = service
        .create(
            &inv,
            EntityCreate {
                id: None,
                schema: "Person".into(),
                properties: props(&[("birthDate", &["next tuesday"])]),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Schema(_)));
}

#[tokio::test]
async fn update_replaces_the_whole_property_set() {
    let (_, service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    seed_entity(
        &service,
        &inv,
        "p1",
        "Person",
        props(&[("name", &["Jane"]), ("country", &["fr"])]),
    )
    .await;

    let updated = service
        .update(
            &inv,
            "p1",
            EntityUpdate {
                properties: props(&[("name", &["Jane Doe"])]),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.properties.values("name"), ["Jane Doe"]);
    assert!(!updated.properties.contains_key("country"));
}

#[tokio::test]
async fn update_missing_entity_returns_none() {
    let (_, service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    let updated = service
        .update(
            &inv,
            "ghost",
            EntityUpdate {
                properties: PropertyMap::new(),
            },
        )
        .await
        .unwrap();
    assert!(updated.is_none());
}

#[tokio::test]
async fn delete_is_idempotent() {
    let (_, service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    seed_entity(&service, &inv, "p1", "Person", PropertyMap::new()).await;

    assert!(service.delete(&inv, "p1").await.unwrap());
    assert!(!service.delete(&inv, "p1").await.unwrap());
    assert!(!service.delete(&inv, "p1").await.unwrap());
}

#[tokio::test]
async fn list_orders_by_id_and_filters_by_search() {
    let (_, service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    seed_entity(&service, &inv, "b", "Person", props(&[("name", &["Zoe"])])).await;
    seed_entity(&service, &inv, "a", "Person", props(&[("name", &["Ann"])])).await;

    let all = service.list(&inv, None).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);

    let hits = service.list(&inv, Some("zoe")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "b");
}

#[tokio::test]
async fn expand_sees_edges_in_both_directions() {
    let (store, service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    seed_entity(&service, &inv, "a", "Person", props(&[("name", &["A"])])).await;
    seed_entity(&service, &inv, "b", "Person", props(&[("name", &["B"])])).await;

    let graph = store.graph(&inv);
    graph
        .run(GraphStatement::UpsertEdge {
            id: "e1".into(),
            schema: "Associate".into(),
            source: "a".into(),
            target: "b".into(),
            properties: PropertyMap::new(),
        })
        .await
        .unwrap();

    let expand_a = service.expand(&inv, "a").await.unwrap().unwrap();
    let expand_b = service.expand(&inv, "b").await.unwrap().unwrap();

    assert_eq!(expand_a.edges.len(), 1);
    assert_eq!(expand_b.edges.len(), 1);
    assert_eq!(expand_a.neighbors.len(), 1);
    assert_eq!(expand_a.neighbors[0].id, "b");
    assert_eq!(expand_b.neighbors[0].id, "a");
    assert!(expand_a.neighbors.iter().all(|n| n.id != "a"));
    assert!(expand_b.neighbors.iter().all(|n| n.id != "b"));
}

#[tokio::test]
async fn expand_missing_entity_returns_none() {
    let (_, service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    assert!(service.expand(&inv, "ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn merge_rewires_edges_and_deletes_sources() {
    let (store, service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    seed_entity(&service, &inv, "p1", "Person", props(&[("name", &["John"])])).await;
    seed_entity(&service, &inv, "p2", "Person", props(&[("name", &["Jon"])])).await;
    seed_entity(&service, &inv, "p3", "Person", props(&[("name", &["Ada"])])).await;

    let graph = store.graph(&inv);
    graph
        .run(GraphStatement::UpsertEdge {
            id: "knows-1".into(),
            schema: "Associate".into(),
            source: "p1".into(),
            target: "p3".into(),
            properties: props(&[("relationship", &["knows"])]),
        })
        .await
        .unwrap();
    graph
        .run(GraphStatement::UpsertEdge {
            id: "works-1".into(),
            schema: "Associate".into(),
            source: "p3".into(),
            target: "p2".into(),
            properties: props(&[("relationship", &["works with"])]),
        })
        .await
        .unwrap();

    let response = service
        .merge(
            &inv,
            MergeRequest {
                source_ids: vec!["p1".into(), "p2".into()],
                target_id: "p2".into(),
                merged_properties: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(response.target.id, "p2");
    assert_eq!(response.merged_source_ids, ["p1"]);
    // union keeps both names
    assert_eq!(response.target.properties.values("name"), ["John", "Jon"]);

    assert!(service.get(&inv, "p1").await.unwrap().is_none());

    let expanded = service.expand(&inv, "p2").await.unwrap().unwrap();
    assert_eq!(expanded.edges.len(), 2);
    let outgoing = expanded
        .edges
        .iter()
        .find(|edge| edge.source == "p2")
        .unwrap();
    assert_eq!(outgoing.target, "p3");
    assert_eq!(outgoing.properties.values("relationship"), ["knows"]);
    let incoming = expanded
        .edges
        .iter()
        .find(|edge| edge.target == "p2")
        .unwrap();
    assert_eq!(incoming.source, "p3");
    assert_eq!(incoming.properties.values("relationship"), ["works with"]);
}

#[tokio::test]
async fn merge_drops_edges_that_would_become_self_loops() {
    let (store, service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    seed_entity(&service, &inv, "p1", "Person", props(&[("name", &["A"])])).await;
    seed_entity(&service, &inv, "p2", "Person", props(&[("name", &["B"])])).await;

    let graph = store.graph(&inv);
    graph
        .run(GraphStatement::UpsertEdge {
            id: "link-1".into(),
            schema: "Associate".into(),
            source: "p1".into(),
            target: "p2".into(),
            properties: PropertyMap::new(),
        })
        .await
        .unwrap();

    service
        .merge(
            &inv,
            MergeRequest {
                source_ids: vec!["p1".into(), "p2".into()],
                target_id: "p2".into(),
                merged_properties: None,
            },
        )
        .await
        .unwrap();

    let (_, edge_count) = store.stats(&inv);
    assert_eq!(edge_count, 0);
}

#[tokio::test]
async fn merge_honors_supplied_properties() {
    let (_, service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    seed_entity(&service, &inv, "p1", "Person", props(&[("name", &["A"])])).await;
    seed_entity(&service, &inv, "p2", "Person", props(&[("name", &["B"])])).await;

    let response = service
        .merge(
            &inv,
            MergeRequest {
                source_ids: vec!["p1".into(), "p2".into()],
                target_id: "p1".into(),
                merged_properties: Some(props(&[("name", &["Chosen Name"])])),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.target.properties.values("name"), ["Chosen Name"]);
}

#[tokio::test]
async fn merge_preconditions() {
    let (_, service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    seed_entity(&service, &inv, "p1", "Person", PropertyMap::new()).await;
    seed_entity(&service, &inv, "c1", "Company", PropertyMap::new()).await;

    let err = service
        .merge(
            &inv,
            MergeRequest {
                source_ids: vec!["p1".into()],
                target_id: "p1".into(),
                merged_properties: None,
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("At least two source_ids"));

    let err = service
        .merge(
            &inv,
            MergeRequest {
                source_ids: vec!["p1".into(), "c1".into()],
                target_id: "elsewhere".into(),
                merged_properties: None,
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("target_id must be one of source_ids"));

    let err = service
        .merge(
            &inv,
            MergeRequest {
                source_ids: vec!["p1".into(), "c1".into()],
                target_id: "p1".into(),
                merged_properties: None,
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("same schema"));

    let err = service
        .merge(
            &inv,
            MergeRequest {
                source_ids: vec!["p1".into(), "ghost".into()],
                target_id: "p1".into(),
                merged_properties: None,
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn duplicate_candidates_score_and_sort() {
    let (_, service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    seed_entity(
        &service,
        &inv,
        "p1",
        "Person",
        props(&[("name", &["John Smith"]), ("country", &["us"])]),
    )
    .await;
    seed_entity(
        &service,
        &inv,
        "p2",
        "Person",
        props(&[("name", &["Jon Smith"]), ("country", &["us"])]),
    )
    .await;
    seed_entity(
        &service,
        &inv,
        "p3",
        "Person",
        props(&[("name", &["Maria Garcia"]), ("country", &["es"])]),
    )
    .await;

    let candidates = service
        .find_duplicates(&inv, Some("Person"), 0.7, 100)
        .await
        .unwrap();
    assert_eq!(candidates.len(), 1);
    let candidate = &candidates[0];
    assert!(candidate.similarity >= 0.7);
    assert!(candidate.reason.contains("name similarity"));
    assert!(candidate.reason.contains("attribute overlap 1.00"));
}

#[tokio::test]
async fn duplicate_threshold_is_monotonic() {
    let (_, service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    for (id, name) in [
        ("p1", "John Smith"),
        ("p2", "Jon Smith"),
        ("p3", "J. Smith"),
        ("p4", "Somebody Else"),
    ] {
        seed_entity(&service, &inv, id, "Person", props(&[("name", &[name])])).await;
    }

    let loose = service.find_duplicates(&inv, None, 0.3, 100).await.unwrap();
    let strict = service.find_duplicates(&inv, None, 0.8, 100).await.unwrap();
    assert!(loose.len() >= strict.len());

    let key = |c: &DuplicateCandidate| (c.left.id.clone(), c.right.id.clone());
    let loose_keys: Vec<_> = loose.iter().map(key).collect();
    for candidate in &strict {
        assert!(loose_keys.contains(&key(candidate)));
    }

    // scores descend
    for pair in loose.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
}

#[tokio::test]
async fn duplicates_never_cross_schemas() {
    let (_, service) = entity_service();
    let inv = InvestigationId::new("inv-1");
    seed_entity(&service, &inv, "p1", "Person", props(&[("name", &["Acme"])])).await;
    seed_entity(&service, &inv, "c1", "Company", props(&[("name", &["Acme"])])).await;

    let candidates = service.find_duplicates(&inv, None, 0.5, 100).await.unwrap();
    assert!(candidates.is_empty());
}
