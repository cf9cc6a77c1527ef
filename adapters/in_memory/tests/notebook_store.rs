//! Notebook CAS behavior.

use casefile_adapter_in_memory::InMemoryNotebookStore;
use casefile_core::prelude::*;
use std::sync::Arc;

fn canvas_with(nodes: usize) -> NotebookCanvas {
    NotebookCanvas {
        nodes: (0..nodes).map(|i| serde_json::json!({"id": i})).collect(),
        ..NotebookCanvas::default()
    }
}

#[tokio::test]
async fn get_or_create_returns_default_at_version_one() {
    let store = InMemoryNotebookStore::new();
    let inv = InvestigationId::new("inv-1");

    let notebook = store.get_or_create(&inv).await.unwrap();
    assert_eq!(notebook.version, 1);
    assert!(notebook.canvas_doc.nodes.is_empty());
    assert_eq!(notebook.canvas_doc.viewport.get("zoom"), Some(&1.0));

    // a second call sees the same row, not a new one
    let again = store.get_or_create(&inv).await.unwrap();
    assert_eq!(again.version, 1);
    assert_eq!(again.created_at, notebook.created_at);
}

#[tokio::test]
async fn save_bumps_version_and_stale_writers_conflict() {
    let store = InMemoryNotebookStore::new();
    let inv = InvestigationId::new("inv-1");
    store.get_or_create(&inv).await.unwrap();

    let saved = store.save(&inv, 1, canvas_with(1)).await.unwrap();
    assert_eq!(saved.version, 2);

    let err = store.save(&inv, 1, canvas_with(2)).await.unwrap_err();
    assert!(matches!(err, NotebookError::Conflict));

    let saved = store.save(&inv, 2, canvas_with(2)).await.unwrap();
    assert_eq!(saved.version, 3);
    assert_eq!(saved.canvas_doc.nodes.len(), 2);
}

#[tokio::test]
async fn save_without_prior_get_creates_the_default_first() {
    let store = InMemoryNotebookStore::new();
    let inv = InvestigationId::new("inv-1");

    let saved = store.save(&inv, 1, canvas_with(3)).await.unwrap();
    assert_eq!(saved.version, 2);
}

#[tokio::test]
async fn concurrent_saves_with_same_version_admit_exactly_one() {
    let store = Arc::new(InMemoryNotebookStore::new());
    let inv = InvestigationId::new("inv-1");
    store.get_or_create(&inv).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        let inv = inv.clone();
        handles.push(tokio::spawn(async move {
            store.save(&inv, 1, canvas_with(i)).await
        }));
    }

    let mut winners = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(saved) => {
                assert_eq!(saved.version, 2);
                winners += 1;
            }
            Err(NotebookError::Conflict) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 7);
}
