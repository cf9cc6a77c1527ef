//! In-memory implementations of the Casefile storage traits.
//!
//! Everything lives behind process-local locks: the graph store interprets
//! the same statement shapes the FalkorDB adapter renders to Cypher, and
//! the notebook, object and workflow-state stores honor the same contracts
//! as their Postgres and S3 counterparts. Used by the test suites and as a
//! zero-dependency development backend.

mod notebook;
mod storage;
mod workflow;

pub use notebook::InMemoryNotebookStore;
pub use storage::InMemoryObjectStore;
pub use workflow::InMemoryStepStore;

use async_trait::async_trait;
use casefile_core::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredNode {
    id: String,
    schema: String,
    properties: PropertyMap,
}

impl StoredNode {
    fn to_entity(&self) -> Entity {
        Entity {
            id: self.id.clone(),
            schema: self.schema.clone(),
            properties: self.properties.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredEdge {
    id: String,
    edge_type: String,
    schema: String,
    source: String,
    target: String,
    properties: PropertyMap,
}

impl StoredEdge {
    fn to_record(&self) -> EdgeRecord {
        EdgeRecord {
            id: self.id.clone(),
            source: self.source.clone(),
            target: self.target.clone(),
            schema: self.schema.clone(),
            properties: self.properties.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryGraph {
    nodes: BTreeMap<String, StoredNode>,
    edges: Vec<StoredEdge>,
}

#[derive(Default)]
struct MemoryState {
    graphs: HashMap<String, MemoryGraph>,
    metadata: HashMap<String, InvestigationMeta>,
}

/// In-memory [`GraphStore`] implementation.
#[derive(Clone, Default)]
pub struct InMemoryGraphStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node and edge counts for one investigation, for assertions.
    pub fn stats(&self, investigation: &InvestigationId) -> (usize, usize) {
        self.state
            .read()
            .ok()
            .and_then(|state| {
                state
                    .graphs
                    .get(&graph_name(investigation))
                    .map(|graph| (graph.nodes.len(), graph.edges.len()))
            })
            .unwrap_or((0, 0))
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    fn graph(&self, investigation: &InvestigationId) -> Arc<dyn InvestigationGraph> {
        let name = graph_name(investigation);
        {
            // graph() is infallible; a poisoned lock degrades to its inner state
            let mut state = self
                .state
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state.graphs.entry(name.clone()).or_default();
        }
        Arc::new(InMemoryGraph {
            name,
            state: Arc::clone(&self.state),
        })
    }

    async fn delete_graph(&self, investigation: &InvestigationId) -> GraphResult<()> {
        let mut state = lock_write(&self.state)?;
        state.graphs.remove(&graph_name(investigation));
        Ok(())
    }

    async fn list_investigations(&self) -> GraphResult<Vec<String>> {
        let state = lock_read(&self.state)?;
        let mut ids: Vec<String> = state
            .graphs
            .keys()
            .filter_map(|name| name.strip_prefix(INVESTIGATION_GRAPH_PREFIX))
            .map(str::to_string)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn put_metadata(&self, meta: &InvestigationMeta) -> GraphResult<()> {
        let mut state = lock_write(&self.state)?;
        state.metadata.insert(meta.id.clone(), meta.clone());
        Ok(())
    }

    async fn get_metadata(&self, id: &str) -> GraphResult<Option<InvestigationMeta>> {
        let state = lock_read(&self.state)?;
        Ok(state.metadata.get(id).cloned())
    }

    async fn list_metadata(&self) -> GraphResult<Vec<InvestigationMeta>> {
        let state = lock_read(&self.state)?;
        let mut metas: Vec<InvestigationMeta> = state.metadata.values().cloned().collect();
        metas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(metas)
    }

    async fn delete_metadata(&self, id: &str) -> GraphResult<()> {
        let mut state = lock_write(&self.state)?;
        state.metadata.remove(id);
        Ok(())
    }

    async fn health_check(&self) -> GraphResult<()> {
        Ok(())
    }
}

fn lock_read(
    state: &Arc<RwLock<MemoryState>>,
) -> GraphResult<std::sync::RwLockReadGuard<'_, MemoryState>> {
    state
        .read()
        .map_err(|_| GraphError::new("graph state poisoned"))
}

fn lock_write(
    state: &Arc<RwLock<MemoryState>>,
) -> GraphResult<std::sync::RwLockWriteGuard<'_, MemoryState>> {
    state
        .write()
        .map_err(|_| GraphError::new("graph state poisoned"))
}

/// Handle onto one in-memory graph; interprets statements directly.
struct InMemoryGraph {
    name: String,
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryGraph {
    /// Empty value lists are persisted as absent.
    fn stripped(properties: PropertyMap) -> PropertyMap {
        properties
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .collect()
    }

    fn matches_search(node: &StoredNode, needle: &str) -> bool {
        if node.id.to_lowercase().contains(needle) {
            return true;
        }
        node.properties
            .values("name")
            .iter()
            .any(|value| value.to_lowercase().contains(needle))
    }
}

#[async_trait]
impl InvestigationGraph for InMemoryGraph {
    async fn run(&self, statement: GraphStatement) -> GraphResult<Vec<Row>> {
        debug!("in-memory {}: {:?}", self.name, statement);
        let mut state = lock_write(&self.state)?;
        let graph = state.graphs.entry(self.name.clone()).or_default();

        let rows = match statement {
            GraphStatement::CreateNode {
                id,
                schema,
                properties,
            } => {
                let node = StoredNode {
                    id: id.clone(),
                    schema,
                    properties: Self::stripped(properties),
                };
                let row = vec![GraphValue::Node(node.to_entity())];
                graph.nodes.insert(id, node);
                vec![row]
            }

            GraphStatement::GetNode { id } => graph
                .nodes
                .get(&id)
                .map(|node| vec![vec![GraphValue::Node(node.to_entity())]])
                .unwrap_or_default(),

            GraphStatement::ListNodes { search } => {
                let needle = search.map(|s| s.to_lowercase());
                graph
                    .nodes
                    .values()
                    .filter(|node| match &needle {
                        Some(needle) => Self::matches_search(node, needle),
                        None => true,
                    })
                    .map(|node| vec![GraphValue::Node(node.to_entity())])
                    .collect()
            }

            GraphStatement::ReplaceNodeProperties { id, properties } => {
                match graph.nodes.get_mut(&id) {
                    Some(node) => {
                        node.properties = Self::stripped(properties);
                        vec![vec![GraphValue::Node(node.to_entity())]]
                    }
                    None => Vec::new(),
                }
            }

            GraphStatement::DeleteNode { id } => {
                if graph.nodes.remove(&id).is_some() {
                    graph
                        .edges
                        .retain(|edge| edge.source != id && edge.target != id);
                    vec![vec![GraphValue::Integer(1)]]
                } else {
                    Vec::new()
                }
            }

            GraphStatement::Expand { id } => {
                let Some(node) = graph.nodes.get(&id) else {
                    return Ok(Vec::new());
                };
                let mut neighbor_ids: Vec<&String> = Vec::new();
                let mut edges: Vec<GraphValue> = Vec::new();
                for edge in &graph.edges {
                    let other = if edge.source == id {
                        &edge.target
                    } else if edge.target == id {
                        &edge.source
                    } else {
                        continue;
                    };
                    edges.push(GraphValue::Edge(edge.to_record()));
                    if !neighbor_ids.contains(&other) {
                        neighbor_ids.push(other);
                    }
                }
                let neighbors: Vec<GraphValue> = neighbor_ids
                    .into_iter()
                    .filter_map(|neighbor_id| graph.nodes.get(neighbor_id))
                    .map(|neighbor| GraphValue::Node(neighbor.to_entity()))
                    .collect();
                vec![vec![
                    GraphValue::Node(node.to_entity()),
                    GraphValue::List(neighbors),
                    GraphValue::List(edges),
                ]]
            }

            GraphStatement::FindNodeIdByName { name } => {
                let folded = name.to_lowercase();
                graph
                    .nodes
                    .values()
                    .find(|node| {
                        node.properties
                            .values("name")
                            .iter()
                            .any(|value| value.to_lowercase() == folded)
                    })
                    .map(|node| vec![vec![GraphValue::Text(node.id.clone())]])
                    .unwrap_or_default()
            }

            GraphStatement::NodeIdsIn { ids } => graph
                .nodes
                .values()
                .filter(|node| ids.contains(&node.id))
                .map(|node| vec![GraphValue::Text(node.id.clone())])
                .collect(),

            GraphStatement::UpsertEdge {
                id,
                schema,
                source,
                target,
                properties,
            } => {
                if !graph.nodes.contains_key(&source) || !graph.nodes.contains_key(&target) {
                    return Ok(Vec::new());
                }
                let edge_type = relation_type(&schema);
                let properties = Self::stripped(properties);
                let position = graph.edges.iter().position(|edge| {
                    edge.edge_type == edge_type
                        && edge.id == id
                        && edge.source == source
                        && edge.target == target
                });
                match position {
                    Some(position) => {
                        let edge = &mut graph.edges[position];
                        edge.schema = schema;
                        edge.properties = properties;
                        vec![vec![GraphValue::Edge(edge.to_record()), GraphValue::Bool(false)]]
                    }
                    None => {
                        let edge = StoredEdge {
                            id,
                            edge_type,
                            schema,
                            source,
                            target,
                            properties,
                        };
                        let row =
                            vec![GraphValue::Edge(edge.to_record()), GraphValue::Bool(true)];
                        graph.edges.push(edge);
                        vec![row]
                    }
                }
            }

            GraphStatement::OutgoingEdges { id } => graph
                .edges
                .iter()
                .filter(|edge| edge.source == id)
                .map(|edge| vec![GraphValue::Edge(edge.to_record())])
                .collect(),

            GraphStatement::IncomingEdges { id } => graph
                .edges
                .iter()
                .filter(|edge| edge.target == id)
                .map(|edge| vec![GraphValue::Edge(edge.to_record())])
                .collect(),

            GraphStatement::CountNodes => {
                vec![vec![GraphValue::Integer(graph.nodes.len() as i64)]]
            }

            GraphStatement::CountEdges => {
                vec![vec![GraphValue::Integer(graph.edges.len() as i64)]]
            }

            GraphStatement::PageNodes { skip, limit } => graph
                .nodes
                .values()
                .skip(skip)
                .take(limit)
                .map(|node| vec![GraphValue::Node(node.to_entity())])
                .collect(),

            GraphStatement::PageEdges { skip, limit } => {
                let mut edges: Vec<&StoredEdge> = graph.edges.iter().collect();
                edges.sort_by(|a, b| {
                    (&a.source, &a.target, &a.id).cmp(&(&b.source, &b.target, &b.id))
                });
                edges
                    .into_iter()
                    .skip(skip)
                    .take(limit)
                    .map(|edge| vec![GraphValue::Edge(edge.to_record())])
                    .collect()
            }
        };
        Ok(rows)
    }
}
