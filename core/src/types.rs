//! Core data types for Casefile

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for an investigation, the tenancy boundary of the
/// system: one graph, one storage bucket, one notebook.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvestigationId(pub String);

impl InvestigationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InvestigationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InvestigationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Multi-valued property map following the FollowTheMoney convention:
/// every property is an ordered list of strings so that multiple pieces of
/// evidence for the same field survive ingestion. Insertion order is
/// preserved; `id` and `schema` never live in here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyMap(IndexMap<String, Vec<String>>);

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// All values for a key; absent keys read as an empty list.
    pub fn values(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value for a key, if any.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.values(key).first().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Vec<String>> {
        self.0.get(key)
    }

    /// Replace the value list for a key.
    pub fn set(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.0.insert(key.into(), values);
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.0.shift_remove(key)
    }

    /// Key-wise union with another map, preserving first-seen key order and
    /// dropping exact-duplicate values. This is the merge rule used when
    /// consolidating duplicate entities.
    pub fn merge(&mut self, other: &PropertyMap) {
        for (key, values) in other.iter() {
            let entry = self.0.entry(key.clone()).or_default();
            for value in values {
                if !entry.contains(value) {
                    entry.push(value.clone());
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl FromIterator<(String, Vec<String>)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PropertyMap {
    type Item = (String, Vec<String>);
    type IntoIter = indexmap::map::IntoIter<String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a PropertyMap {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = indexmap::map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A typed node in an investigation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub schema: String,
    pub properties: PropertyMap,
}

impl Entity {
    /// Display name: first `name` value, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.properties.first("name").unwrap_or(&self.id)
    }
}

/// Request to create an entity. The id is assigned server-side when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCreate {
    #[serde(default)]
    pub id: Option<String>,
    pub schema: String,
    #[serde(default)]
    pub properties: PropertyMap,
}

/// Request to update an entity. Replaces the whole property set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub properties: PropertyMap,
}

/// A directed, typed relationship between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: String,
    pub source: String,
    pub target: String,
    pub schema: String,
    pub properties: PropertyMap,
}

/// Result of expanding an entity: every edge in either direction plus the
/// distinct other endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityExpand {
    pub entity: Entity,
    pub neighbors: Vec<Entity>,
    pub edges: Vec<EdgeRecord>,
}

/// Potential duplicate pair for manual review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub left: Entity,
    pub right: Entity,
    pub similarity: f64,
    pub reason: String,
}

/// Request to merge several entities into a chosen target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub source_ids: Vec<String>,
    pub target_id: String,
    #[serde(default)]
    pub merged_properties: Option<PropertyMap>,
}

/// Response after a merge: the updated target and the sources that were
/// folded into it, in request order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResponse {
    pub target: Entity,
    pub merged_source_ids: Vec<String>,
}

/// Investigation metadata persisted in the meta graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationMeta {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request to create an investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationCreate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Investigation response model, with the entity count fanned in at read
/// time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investigation {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub entity_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationList {
    pub items: Vec<Investigation>,
    pub total: usize,
}

/// Node shape for graph page responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphPageNode {
    pub id: String,
    pub schema: String,
    pub label: String,
    pub properties: PropertyMap,
}

/// Edge shape for graph page responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphPageEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub schema: String,
    pub label: String,
    pub properties: PropertyMap,
}

/// Paginated graph data for an investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphPage {
    pub nodes: Vec<GraphPageNode>,
    pub edges: Vec<GraphPageEdge>,
    pub total_nodes: u64,
    pub total_edges: u64,
}

/// Response for ingestion operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResult {
    pub processed: usize,
    pub nodes_created: usize,
    pub edges_created: usize,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IngestResult {
    pub fn new(
        processed: usize,
        nodes_created: usize,
        edges_created: usize,
        errors: Vec<String>,
    ) -> Self {
        Self {
            processed,
            nodes_created,
            edges_created,
            errors,
            status: None,
            workflow_id: None,
            message: None,
        }
    }
}

/// Lifecycle states of a document extraction workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Success,
    Error,
    Cancelled,
    NotFound,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
            Self::Cancelled => "CANCELLED",
            Self::NotFound => "NOT_FOUND",
        };
        write!(f, "{s}")
    }
}

/// Status response for asynchronous extraction workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionStatus {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Free-form canvas payload persisted per investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookCanvas {
    #[serde(default)]
    pub nodes: Vec<serde_json::Value>,
    #[serde(default)]
    pub edges: Vec<serde_json::Value>,
    #[serde(default = "NotebookCanvas::default_viewport")]
    pub viewport: BTreeMap<String, f64>,
}

impl NotebookCanvas {
    fn default_viewport() -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("x".to_string(), 0.0),
            ("y".to_string(), 0.0),
            ("zoom".to_string(), 1.0),
        ])
    }
}

impl Default for NotebookCanvas {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            viewport: Self::default_viewport(),
        }
    }
}

/// Notebook state returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookDocument {
    pub investigation_id: String,
    pub version: i32,
    pub canvas_doc: NotebookCanvas,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Notebook update request body (optimistic concurrency).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookUpdate {
    pub version: i32,
    pub canvas_doc: NotebookCanvas,
}

/// Coarse classification of a parsed document, used to pick the extraction
/// prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Email,
    SecFiling,
    General,
}

/// Plain text and metadata pulled out of an uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub content: String,
    pub mime_type: String,
    pub metadata: BTreeMap<String, String>,
    pub document_type: DocumentType,
}

/// A node or relation candidate produced by LLM extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionCandidate {
    pub schema: String,
    pub properties: PropertyMap,
}

/// Normalized hit from the sanctions search service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanctionsMatch {
    pub id: String,
    pub schema: String,
    pub caption: String,
    pub score: Option<f64>,
    #[serde(default)]
    pub datasets: Vec<String>,
    #[serde(default)]
    pub properties: PropertyMap,
}

/// Sanctions search response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanctionsSearchResponse {
    pub query: String,
    pub total: usize,
    pub results: Vec<SanctionsMatch>,
}

/// Response for linking an entity through sanctions-list adjacency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkResponse {
    pub investigation_id: String,
    pub entity_id: String,
    pub linked_to: Vec<String>,
    pub links_applied: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &[&str])]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn property_map_merge_keeps_first_seen_order() {
        let mut left = props(&[("name", &["Alice"]), ("country", &["fr"])]);
        let right = props(&[("name", &["Alice", "A. Smith"]), ("email", &["a@ex.org"])]);

        left.merge(&right);

        let keys: Vec<&String> = left.keys().collect();
        assert_eq!(keys, ["name", "country", "email"]);
        assert_eq!(left.values("name"), ["Alice", "A. Smith"]);
    }

    #[test]
    fn property_map_absent_key_reads_empty() {
        let map = PropertyMap::new();
        assert!(map.values("name").is_empty());
        assert!(map.first("name").is_none());
    }

    #[test]
    fn entity_display_name_falls_back_to_id() {
        let entity = Entity {
            id: "e-1".into(),
            schema: "Person".into(),
            properties: PropertyMap::new(),
        };
        assert_eq!(entity.display_name(), "e-1");
    }

    #[test]
    fn workflow_status_serializes_screaming_case() {
        let json = serde_json::to_string(&WorkflowStatus::NotFound).unwrap();
        assert_eq!(json, "\"NOT_FOUND\"");
        assert_eq!(WorkflowStatus::Success.to_string(), "SUCCESS");
    }

    #[test]
    fn notebook_canvas_default_viewport() {
        let canvas = NotebookCanvas::default();
        assert_eq!(canvas.viewport.get("zoom"), Some(&1.0));
        assert!(canvas.nodes.is_empty());
    }
}
