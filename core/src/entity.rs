//! Entity CRUD, expansion, duplicate scoring and merge.

use crate::errors::{CoreError, CoreResult};
use crate::graph::{GraphStatement, GraphStore, InvestigationGraph};
use crate::schema::SchemaCatalog;
use crate::types::{
    DuplicateCandidate, EdgeRecord, Entity, EntityCreate, EntityExpand, EntityUpdate,
    InvestigationId, MergeRequest, MergeResponse, PropertyMap,
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const MIN_MERGE_SOURCE_IDS: usize = 2;

/// Attribute fields compared pairwise when scoring duplicate candidates.
const COMPARABLE_FIELDS: [&str; 8] = [
    "birthDate",
    "country",
    "nationality",
    "jurisdiction",
    "registrationNumber",
    "email",
    "innCode",
    "vatCode",
];

/// Manage entities within an investigation graph.
pub struct EntityService {
    graph_store: Arc<dyn GraphStore>,
    catalog: Arc<SchemaCatalog>,
}

impl EntityService {
    pub fn new(graph_store: Arc<dyn GraphStore>, catalog: Arc<SchemaCatalog>) -> Self {
        Self {
            graph_store,
            catalog,
        }
    }

    pub fn graph_store(&self) -> &Arc<dyn GraphStore> {
        &self.graph_store
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    pub fn graph(&self, investigation: &InvestigationId) -> Arc<dyn InvestigationGraph> {
        self.graph_store.graph(investigation)
    }

    pub async fn create(
        &self,
        investigation: &InvestigationId,
        payload: EntityCreate,
    ) -> CoreResult<Entity> {
        self.catalog.validate(&payload.schema, &payload.properties)?;

        let graph = self.graph(investigation);
        let entity_id = payload
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let existing = graph
            .run(GraphStatement::GetNode {
                id: entity_id.clone(),
            })
            .await?;
        if !existing.is_empty() {
            return Err(CoreError::validation(format!(
                "Entity '{entity_id}' already exists"
            )));
        }

        debug!("Creating entity {} in {}", entity_id, investigation);
        let rows = graph
            .run(GraphStatement::CreateNode {
                id: entity_id.clone(),
                schema: payload.schema,
                properties: payload.properties,
            })
            .await?;
        Self::first_node(rows)
            .ok_or_else(|| CoreError::internal(format!("Entity '{entity_id}' was not persisted")))
    }

    pub async fn list(
        &self,
        investigation: &InvestigationId,
        search: Option<&str>,
    ) -> CoreResult<Vec<Entity>> {
        let graph = self.graph(investigation);
        let rows = graph
            .run(GraphStatement::ListNodes {
                search: search.map(str::to_string),
            })
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|value| value.as_node().cloned())
            .collect())
    }

    pub async fn get(
        &self,
        investigation: &InvestigationId,
        entity_id: &str,
    ) -> CoreResult<Option<Entity>> {
        let graph = self.graph(investigation);
        let rows = graph
            .run(GraphStatement::GetNode {
                id: entity_id.to_string(),
            })
            .await?;
        Ok(Self::first_node(rows))
    }

    /// Replace the whole property set of an entity.
    pub async fn update(
        &self,
        investigation: &InvestigationId,
        entity_id: &str,
        payload: EntityUpdate,
    ) -> CoreResult<Option<Entity>> {
        let Some(current) = self.get(investigation, entity_id).await? else {
            return Ok(None);
        };
        self.catalog.validate(&current.schema, &payload.properties)?;

        let graph = self.graph(investigation);
        let rows = graph
            .run(GraphStatement::ReplaceNodeProperties {
                id: entity_id.to_string(),
                properties: payload.properties,
            })
            .await?;
        Ok(Self::first_node(rows))
    }

    /// Detach-delete. Returns whether a node was actually removed.
    pub async fn delete(
        &self,
        investigation: &InvestigationId,
        entity_id: &str,
    ) -> CoreResult<bool> {
        let graph = self.graph(investigation);
        let rows = graph
            .run(GraphStatement::DeleteNode {
                id: entity_id.to_string(),
            })
            .await?;
        Ok(!rows.is_empty())
    }

    /// Neighboring entities and the edges that connect them, both
    /// directions; the entity itself never appears among its neighbors.
    pub async fn expand(
        &self,
        investigation: &InvestigationId,
        entity_id: &str,
    ) -> CoreResult<Option<EntityExpand>> {
        let graph = self.graph(investigation);
        let mut rows = graph
            .run(GraphStatement::Expand {
                id: entity_id.to_string(),
            })
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut row = rows.remove(0).into_iter();
        let entity = row
            .next()
            .and_then(|value| value.as_node().cloned())
            .ok_or_else(|| CoreError::internal("expand returned no entity"))?;
        let neighbors = row
            .next()
            .and_then(|value| value.as_list().map(<[_]>::to_vec))
            .unwrap_or_default()
            .iter()
            .filter_map(|value| value.as_node().cloned())
            .filter(|neighbor| neighbor.id != entity_id)
            .collect();
        let edges = row
            .next()
            .and_then(|value| value.as_list().map(<[_]>::to_vec))
            .unwrap_or_default()
            .iter()
            .filter_map(|value| value.as_edge().cloned())
            .collect();

        Ok(Some(EntityExpand {
            entity,
            neighbors,
            edges,
        }))
    }

    /// Paginated node and edge window over an investigation graph, with
    /// display labels precomputed for rendering.
    pub async fn graph_page(
        &self,
        investigation: &InvestigationId,
        skip: usize,
        limit: usize,
    ) -> CoreResult<crate::types::GraphPage> {
        let graph = self.graph(investigation);

        let nodes = graph
            .run(GraphStatement::PageNodes { skip, limit })
            .await?
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|value| value.as_node().cloned())
            .map(|entity| crate::types::GraphPageNode {
                label: entity.display_name().to_string(),
                id: entity.id,
                schema: entity.schema,
                properties: entity.properties,
            })
            .collect();

        let edges = graph
            .run(GraphStatement::PageEdges { skip, limit })
            .await?
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|value| value.as_edge().cloned())
            .map(|edge| crate::types::GraphPageEdge {
                label: edge.schema.clone(),
                id: edge.id,
                source: edge.source,
                target: edge.target,
                schema: edge.schema,
                properties: edge.properties,
            })
            .collect();

        let count = |rows: Vec<crate::graph::Row>| {
            rows.first()
                .and_then(|row| row.first())
                .and_then(|value| value.as_integer())
                .unwrap_or(0)
                .max(0) as u64
        };
        let total_nodes = count(graph.run(GraphStatement::CountNodes).await?);
        let total_edges = count(graph.run(GraphStatement::CountEdges).await?);

        Ok(crate::types::GraphPage {
            nodes,
            edges,
            total_nodes,
            total_edges,
        })
    }

    /// Pairwise duplicate scoring over same-schema entities, best first.
    pub async fn find_duplicates(
        &self,
        investigation: &InvestigationId,
        schema: Option<&str>,
        threshold: f64,
        limit: usize,
    ) -> CoreResult<Vec<DuplicateCandidate>> {
        let mut entities = self.list(investigation, None).await?;
        if let Some(schema) = schema {
            entities.retain(|entity| entity.schema == schema);
        }

        let mut candidates = Vec::new();
        for (index, left) in entities.iter().enumerate() {
            for right in entities.iter().skip(index + 1) {
                if left.schema != right.schema {
                    continue;
                }
                let (similarity, reason) = Self::similarity(left, right);
                if similarity < threshold {
                    continue;
                }
                candidates.push(DuplicateCandidate {
                    left: left.clone(),
                    right: right.clone(),
                    similarity: (similarity * 10_000.0).round() / 10_000.0,
                    reason,
                });
            }
        }

        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    /// Fold several same-schema entities into a target: union properties,
    /// rewire every edge of the other sources onto the target, delete the
    /// sources.
    pub async fn merge(
        &self,
        investigation: &InvestigationId,
        request: MergeRequest,
    ) -> CoreResult<MergeResponse> {
        let mut unique_ids: Vec<String> = Vec::new();
        for id in &request.source_ids {
            let trimmed = id.trim();
            if !trimmed.is_empty() && !unique_ids.iter().any(|seen| seen == trimmed) {
                unique_ids.push(trimmed.to_string());
            }
        }
        if unique_ids.len() < MIN_MERGE_SOURCE_IDS {
            return Err(CoreError::validation("At least two source_ids are required"));
        }
        let target_id = request.target_id;
        if !unique_ids.iter().any(|id| id == &target_id) {
            return Err(CoreError::validation("target_id must be one of source_ids"));
        }

        let mut entities: Vec<Entity> = Vec::with_capacity(unique_ids.len());
        for entity_id in &unique_ids {
            let entity = self.get(investigation, entity_id).await?.ok_or_else(|| {
                CoreError::validation(format!("Entity '{entity_id}' not found"))
            })?;
            entities.push(entity);
        }

        let schema = entities[0].schema.clone();
        if entities.iter().any(|entity| entity.schema != schema) {
            return Err(CoreError::validation(
                "All source entities must have the same schema",
            ));
        }

        let final_properties = match request.merged_properties {
            Some(properties) => properties,
            None => {
                let mut merged = PropertyMap::new();
                for entity in &entities {
                    merged.merge(&entity.properties);
                }
                merged
            }
        };
        self.catalog.validate(&schema, &final_properties)?;

        let graph = self.graph(investigation);
        for source_id in unique_ids.iter().filter(|id| *id != &target_id) {
            let outgoing = Self::edge_rows(
                graph
                    .run(GraphStatement::OutgoingEdges {
                        id: source_id.clone(),
                    })
                    .await?,
            );
            let incoming = Self::edge_rows(
                graph
                    .run(GraphStatement::IncomingEdges {
                        id: source_id.clone(),
                    })
                    .await?,
            );

            for edge in outgoing {
                if edge.target == target_id {
                    continue;
                }
                self.recreate_edge(&graph, &edge, target_id.clone(), edge.target.clone())
                    .await?;
            }
            for edge in incoming {
                if edge.source == target_id {
                    continue;
                }
                self.recreate_edge(&graph, &edge, edge.source.clone(), target_id.clone())
                    .await?;
            }

            graph
                .run(GraphStatement::DeleteNode {
                    id: source_id.clone(),
                })
                .await?;
        }

        let rows = graph
            .run(GraphStatement::ReplaceNodeProperties {
                id: target_id.clone(),
                properties: final_properties,
            })
            .await?;
        let target = Self::first_node(rows).ok_or_else(|| {
            CoreError::internal(format!("Merged entity '{target_id}' not found"))
        })?;

        let merged_source_ids = unique_ids
            .into_iter()
            .filter(|id| id != &target_id)
            .collect::<Vec<_>>();
        info!(
            "Merged {} entities into {} in {}",
            merged_source_ids.len(),
            target_id,
            investigation
        );
        Ok(MergeResponse {
            target,
            merged_source_ids,
        })
    }

    async fn recreate_edge(
        &self,
        graph: &Arc<dyn InvestigationGraph>,
        edge: &EdgeRecord,
        source: String,
        target: String,
    ) -> CoreResult<()> {
        graph
            .run(GraphStatement::UpsertEdge {
                id: edge.id.clone(),
                schema: edge.schema.clone(),
                source,
                target,
                properties: edge.properties.clone(),
            })
            .await?;
        Ok(())
    }

    fn first_node(rows: Vec<crate::graph::Row>) -> Option<Entity> {
        rows.into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .and_then(|value| value.as_node().cloned())
    }

    fn edge_rows(rows: Vec<crate::graph::Row>) -> Vec<EdgeRecord> {
        rows.into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|value| value.as_edge().cloned())
            .collect()
    }

    /// Composite similarity: 0.7 × name ratio plus 0.3 × the share of
    /// comparable attribute fields whose value sets intersect.
    fn similarity(left: &Entity, right: &Entity) -> (f64, String) {
        let left_name = left.display_name().to_lowercase();
        let right_name = right.display_name().to_lowercase();
        let name_similarity = sequence_ratio(&left_name, &right_name);

        let mut score = 0.7 * name_similarity;
        let mut reasons = vec![format!("name similarity {name_similarity:.2}")];

        let mut checked_fields = 0usize;
        let mut overlap_count = 0usize;
        for field in COMPARABLE_FIELDS {
            let left_values: Vec<String> = left
                .properties
                .values(field)
                .iter()
                .map(|value| value.to_lowercase())
                .collect();
            let right_values: Vec<String> = right
                .properties
                .values(field)
                .iter()
                .map(|value| value.to_lowercase())
                .collect();
            if left_values.is_empty() || right_values.is_empty() {
                continue;
            }
            checked_fields += 1;
            if left_values.iter().any(|value| right_values.contains(value)) {
                overlap_count += 1;
            }
        }

        if checked_fields > 0 {
            let overlap_ratio = overlap_count as f64 / checked_fields as f64;
            score += 0.3 * overlap_ratio;
            reasons.push(format!("attribute overlap {overlap_ratio:.2}"));
        }

        (score.min(1.0), reasons.join(", "))
    }
}

/// Ratcliff/Obershelp ratio: twice the number of matching characters over
/// the combined length, with matches found by recursively splitting around
/// the longest common substring.
pub fn sequence_ratio(left: &str, right: &str) -> f64 {
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();
    let total = left.len() + right.len();
    if total == 0 {
        return 1.0;
    }
    let matches = matching_chars(&left, &right);
    2.0 * matches as f64 / total as f64
}

fn matching_chars(left: &[char], right: &[char]) -> usize {
    if left.is_empty() || right.is_empty() {
        return 0;
    }
    let (start_left, start_right, length) = longest_common_block(left, right);
    if length == 0 {
        return 0;
    }
    length
        + matching_chars(&left[..start_left], &right[..start_right])
        + matching_chars(&left[start_left + length..], &right[start_right + length..])
}

fn longest_common_block(left: &[char], right: &[char]) -> (usize, usize, usize) {
    let mut best = (0usize, 0usize, 0usize);
    let mut lengths = vec![0usize; right.len() + 1];
    for (i, left_char) in left.iter().enumerate() {
        let mut previous = 0usize;
        for (j, right_char) in right.iter().enumerate() {
            let current = lengths[j + 1];
            if left_char == right_char {
                let run = previous + 1;
                lengths[j + 1] = run;
                if run > best.2 {
                    best = (i + 1 - run, j + 1 - run, run);
                }
            } else {
                lengths[j + 1] = 0;
            }
            previous = current;
        }
    }
    best
}
