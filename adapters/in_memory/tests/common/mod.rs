//! Shared wiring for the behavior suites.

use casefile_adapter_in_memory::InMemoryGraphStore;
use casefile_core::prelude::*;
use std::sync::Arc;

pub fn entity_service() -> (Arc<InMemoryGraphStore>, Arc<EntityService>) {
    let store = Arc::new(InMemoryGraphStore::new());
    let catalog = Arc::new(SchemaCatalog::new());
    let service = Arc::new(EntityService::new(store.clone(), catalog));
    (store, service)
}

pub fn props(pairs: &[(&str, &[&str])]) -> PropertyMap {
    pairs
        .iter()
        .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
        .collect()
}

pub async fn seed_entity(
    service: &EntityService,
    investigation: &InvestigationId,
    id: &str,
    schema: &str,
    properties: PropertyMap,
) -> Entity {
    service
        .create(
            investigation,
            EntityCreate {
                id: Some(id.to_string()),
                schema: schema.to_string(),
                properties,
            },
        )
        .await
        .expect("seed entity")
}
