//! Yente/OpenSanctions client.
//!
//! Two endpoints matter: `/search/{dataset}` for full-text lookup and
//! `/entities/{id}/adjacent` for the adjacency payload the enrichment
//! linker walks. Responses are normalized into the core sanctions models;
//! every id found anywhere in an adjacency result's property maps counts
//! as adjacent.

use async_trait::async_trait;
use casefile_core::errors::EnrichError;
use casefile_core::traits::SanctionsClient;
use casefile_core::types::{PropertyMap, SanctionsMatch, SanctionsSearchResponse};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Connection settings for the sanctions service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YenteConfig {
    pub base_url: String,
    pub dataset: String,
    pub timeout_seconds: u64,
}

impl Default for YenteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            dataset: "default".to_string(),
            timeout_seconds: 15,
        }
    }
}

/// HTTP implementation of [`SanctionsClient`].
pub struct YenteClient {
    client: Client,
    config: YenteConfig,
}

impl YenteClient {
    pub fn new(config: YenteConfig) -> Result<Self, EnrichError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|err| EnrichError::new(format!("failed to create HTTP client: {err}")))?;
        Ok(Self { client, config })
    }

    async fn request_json(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value, EnrichError> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        debug!("Yente request: {}", url);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|err| EnrichError::new(format!("Yente request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EnrichError::new(format!(
                "Yente request failed ({status}): {detail}"
            )));
        }

        response
            .json()
            .await
            .map_err(|err| EnrichError::new(format!("Yente request failed: {err}")))
    }

    fn normalize_properties(raw: Option<&serde_json::Value>) -> PropertyMap {
        let mut properties = PropertyMap::new();
        let Some(serde_json::Value::Object(map)) = raw else {
            return properties;
        };
        for (key, value) in map {
            let values = match value {
                serde_json::Value::Array(items) => items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(json_to_string)
                    .collect(),
                serde_json::Value::Null => Vec::new(),
                other => vec![json_to_string(other)],
            };
            properties.set(key.clone(), values);
        }
        properties
    }

    /// Hits arrive either wrapped (`{"entity": {...}, "score": ...}`) or
    /// bare; both carry id/schema/caption.
    fn normalize_result(item: &serde_json::Value) -> Option<SanctionsMatch> {
        let entity = match item.get("entity") {
            Some(entity) if entity.is_object() => entity,
            _ => item,
        };

        let id = entity.get("id").and_then(|value| value.as_str())?;
        let schema = entity.get("schema").and_then(|value| value.as_str())?;

        let caption = entity
            .get("caption")
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .or_else(|| {
                entity
                    .get("name")
                    .and_then(|value| value.as_str())
                    .map(str::to_string)
            })
            .or_else(|| {
                entity
                    .get("properties")
                    .and_then(|props| props.get("name"))
                    .and_then(|names| names.as_array())
                    .and_then(|names| names.first())
                    .and_then(|name| name.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| id.to_string());

        let score = item.get("score").and_then(|value| value.as_f64());
        let datasets = entity
            .get("datasets")
            .and_then(|value| value.as_array())
            .map(|items| items.iter().map(json_to_string).collect())
            .unwrap_or_default();

        Some(SanctionsMatch {
            id: id.to_string(),
            schema: schema.to_string(),
            caption,
            score,
            datasets,
            properties: Self::normalize_properties(entity.get("properties")),
        })
    }

    /// Recursively harvest every `id` key in the payload.
    fn collect_entity_ids(value: &serde_json::Value, ids: &mut BTreeSet<String>) {
        match value {
            serde_json::Value::Object(map) => {
                if let Some(id) = map.get("id") {
                    match id {
                        serde_json::Value::String(id) => {
                            ids.insert(id.clone());
                        }
                        serde_json::Value::Number(id) => {
                            ids.insert(id.to_string());
                        }
                        _ => {}
                    }
                }
                for nested in map.values() {
                    Self::collect_entity_ids(nested, ids);
                }
            }
            serde_json::Value::Array(items) => {
                for nested in items {
                    Self::collect_entity_ids(nested, ids);
                }
            }
            _ => {}
        }
    }
}

fn json_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SanctionsClient for YenteClient {
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<SanctionsSearchResponse, EnrichError> {
        let q = query.trim();
        if q.is_empty() {
            return Ok(SanctionsSearchResponse {
                query: query.to_string(),
                total: 0,
                results: Vec::new(),
            });
        }

        let payload = self
            .request_json(
                &format!("search/{}", urlencoding::encode(&self.config.dataset)),
                &[("q", q.to_string()), ("limit", limit.to_string())],
            )
            .await?;

        let results: Vec<SanctionsMatch> = payload
            .get("results")
            .and_then(|value| value.as_array())
            .map(|items| items.iter().filter_map(Self::normalize_result).collect())
            .unwrap_or_default();
        let total = payload
            .get("total")
            .and_then(|value| value.as_u64())
            .map(|total| total as usize)
            .unwrap_or(results.len());

        info!("Yente search '{}' returned {} results", q, results.len());
        Ok(SanctionsSearchResponse {
            query: q.to_string(),
            total,
            results,
        })
    }

    async fn adjacent_entity_ids(&self, entity_id: &str) -> Result<Vec<String>, EnrichError> {
        let payload = self
            .request_json(
                &format!("entities/{}/adjacent", urlencoding::encode(entity_id)),
                &[],
            )
            .await?;

        let mut ids = BTreeSet::new();
        if let Some(serde_json::Value::Object(buckets)) = payload.get("adjacent") {
            for bucket in buckets.values() {
                if let Some(results) = bucket.get("results").and_then(|value| value.as_array()) {
                    for result in results {
                        if let Some(properties) = result.get("properties") {
                            Self::collect_entity_ids(properties, &mut ids);
                        }
                    }
                }
            }
        }

        ids.remove(entity_id);
        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server_url: &str) -> YenteClient {
        YenteClient::new(YenteConfig {
            base_url: server_url.to_string(),
            dataset: "default".to_string(),
            timeout_seconds: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn search_normalizes_wrapped_hits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/default"))
            .and(query_param("q", "putin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 2,
                "results": [
                    {
                        "score": 0.98,
                        "entity": {
                            "id": "Q7747",
                            "schema": "Person",
                            "caption": "Vladimir Putin",
                            "datasets": ["eu_fsf"],
                            "properties": {"name": ["Vladimir Putin"], "country": ["ru"]}
                        }
                    },
                    {"id": "Q2", "schema": "Person", "properties": {"name": ["Other"]}},
                    {"nonsense": true}
                ]
            })))
            .mount(&server)
            .await;

        let response = client_for(&server.uri()).search("putin", 20).await.unwrap();
        assert_eq!(response.total, 2);
        assert_eq!(response.results.len(), 2);
        let first = &response.results[0];
        assert_eq!(first.id, "Q7747");
        assert_eq!(first.caption, "Vladimir Putin");
        assert_eq!(first.score, Some(0.98));
        assert_eq!(first.datasets, ["eu_fsf"]);
        assert_eq!(first.properties.values("country"), ["ru"]);
        // bare hit falls back to the name property for its caption
        assert_eq!(response.results[1].caption, "Other");
    }

    #[tokio::test]
    async fn blank_queries_short_circuit() {
        let client = client_for("http://unused.invalid");
        let response = client.search("   ", 20).await.unwrap();
        assert_eq!(response.total, 0);
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn adjacency_harvests_nested_ids_and_drops_self() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/entities/Q1/adjacent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "adjacent": {
                    "ownershipOwner": {
                        "results": [
                            {
                                "id": "rel-1",
                                "properties": {
                                    "asset": [{"id": "Q2", "properties": {"owner": [{"id": "Q3"}]}}],
                                    "owner": [{"id": "Q1"}]
                                }
                            }
                        ]
                    },
                    "empty": {"results": []}
                }
            })))
            .mount(&server)
            .await;

        let ids = client_for(&server.uri())
            .adjacent_entity_ids("Q1")
            .await
            .unwrap();
        assert_eq!(ids, ["Q2", "Q3"]);
    }

    #[tokio::test]
    async fn upstream_failures_become_enrich_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client_for(&server.uri())
            .adjacent_entity_ids("Q1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("502"));
    }
}
