//! Graph substrate: typed statements, row values and the storage traits.
//!
//! Services never speak Cypher. They issue [`GraphStatement`]s against a
//! per-investigation [`InvestigationGraph`] handle and read back rows of
//! [`GraphValue`]s. The FalkorDB adapter renders statements to Cypher; the
//! in-memory adapter interprets them directly. The underscore prefix that
//! keeps entity properties clear of reserved node attributes is applied and
//! stripped entirely inside the adapters.

use crate::errors::GraphResult;
use crate::types::{EdgeRecord, Entity, InvestigationId, InvestigationMeta, PropertyMap};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A single cell in a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<GraphValue>),
    Map(BTreeMap<String, GraphValue>),
    Node(Entity),
    Edge(EdgeRecord),
}

impl GraphValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Entity> {
        match self {
            Self::Node(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_edge(&self) -> Option<&EdgeRecord> {
        match self {
            Self::Edge(edge) => Some(edge),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[GraphValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

/// One result row.
pub type Row = Vec<GraphValue>;

/// The enumerated query shapes the services need. Each variant documents
/// the rows an adapter must produce.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphStatement {
    /// Create a node. Duplicate-id checks happen in the entity service,
    /// not here. Returns one row `[Node]`.
    CreateNode {
        id: String,
        schema: String,
        properties: PropertyMap,
    },
    /// Zero or one row `[Node]`.
    GetNode { id: String },
    /// One row `[Node]` per match, ordered by id. `search` matches
    /// case-insensitively against the id or any `name` value.
    ListNodes { search: Option<String> },
    /// Remove every property outside `{id, schema}`, then set the given
    /// ones. Zero rows when the node is absent, else one row `[Node]`.
    ReplaceNodeProperties { id: String, properties: PropertyMap },
    /// Detach-delete. One row when a node was deleted, zero otherwise.
    DeleteNode { id: String },
    /// Zero or one row `[Node, List<Node>, List<Edge>]`: the entity, its
    /// distinct neighbors (self excluded), and every edge in either
    /// direction.
    Expand { id: String },
    /// Case-insensitive match on any `name` value. Zero or one row
    /// `[Text(node_id)]`.
    FindNodeIdByName { name: String },
    /// One row `[Text(node_id)]` per listed id that exists.
    NodeIdsIn { ids: Vec<String> },
    /// Merge an edge by id between two existing nodes, set its `schema`
    /// marker and replace the carried properties. One row
    /// `[Edge, Bool(created)]` on success (the flag is `true` when the
    /// edge was created rather than matched) and zero rows when either
    /// endpoint is missing.
    UpsertEdge {
        id: String,
        schema: String,
        source: String,
        target: String,
        properties: PropertyMap,
    },
    /// One row `[Edge]` per edge leaving the node.
    OutgoingEdges { id: String },
    /// One row `[Edge]` per edge arriving at the node.
    IncomingEdges { id: String },
    /// One row `[Integer]`.
    CountNodes,
    /// One row `[Integer]`.
    CountEdges,
    /// One row `[Node]` per node in a stable id order window.
    PageNodes { skip: usize, limit: usize },
    /// One row `[Edge]` per edge in a stable (source, target) order window.
    PageEdges { skip: usize, limit: usize },
}

/// Handle onto one investigation's graph. Implementations are cheap to
/// clone behind an `Arc` and safe to share across request handlers.
#[async_trait]
pub trait InvestigationGraph: Send + Sync {
    async fn run(&self, statement: GraphStatement) -> GraphResult<Vec<Row>>;
}

/// The graph storage backend: per-investigation graphs plus the singleton
/// metadata graph that indexes investigations.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Handle for an investigation's graph; created lazily on first write.
    fn graph(&self, investigation: &InvestigationId) -> Arc<dyn InvestigationGraph>;

    /// Drop an investigation's graph. Idempotent.
    async fn delete_graph(&self, investigation: &InvestigationId) -> GraphResult<()>;

    /// Investigation ids recovered from the backend's graph names.
    async fn list_investigations(&self) -> GraphResult<Vec<String>>;

    /// Upsert one investigation's metadata record in the meta graph.
    async fn put_metadata(&self, meta: &InvestigationMeta) -> GraphResult<()>;

    async fn get_metadata(&self, id: &str) -> GraphResult<Option<InvestigationMeta>>;

    /// All metadata records, newest first.
    async fn list_metadata(&self) -> GraphResult<Vec<InvestigationMeta>>;

    async fn delete_metadata(&self, id: &str) -> GraphResult<()>;

    async fn health_check(&self) -> GraphResult<()>;
}

/// Graph names are `investigation_{id}`; the meta graph sits beside them so
/// deleting an investigation never disturbs the index.
pub const INVESTIGATION_GRAPH_PREFIX: &str = "investigation_";
pub const META_GRAPH_NAME: &str = "investigations_meta";

/// Build the backend graph name for an investigation.
pub fn graph_name(investigation: &InvestigationId) -> String {
    format!("{INVESTIGATION_GRAPH_PREFIX}{investigation}")
}

/// Sanitize a relation schema into a storable edge type: uppercased, with
/// every non-alphanumeric squashed to `_`, and a `R_` prefix when the name
/// would start with a digit.
pub fn relation_type(schema: &str) -> String {
    let cleaned: String = schema
        .to_uppercase()
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { '_' })
        .collect();
    if cleaned.is_empty() {
        return "RELATED".to_string();
    }
    if cleaned.chars().next().is_some_and(|ch| ch.is_ascii_digit()) {
        return format!("R_{cleaned}");
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_type_sanitizes() {
        assert_eq!(relation_type("Employment"), "EMPLOYMENT");
        assert_eq!(relation_type("unknown-link"), "UNKNOWN_LINK");
        assert_eq!(relation_type("10b5 plan"), "R_10B5_PLAN");
        assert_eq!(relation_type(""), "RELATED");
        assert_eq!(relation_type("!!!"), "___");
    }

    #[test]
    fn graph_names_carry_the_prefix() {
        let inv = InvestigationId::new("abc");
        assert_eq!(graph_name(&inv), "investigation_abc");
    }
}
