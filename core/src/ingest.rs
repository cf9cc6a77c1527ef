//! Structured FTM-record ingestion.
//!
//! Accepts JSON arrays or newline-delimited JSON of FTM-shaped records,
//! classifies each one as a node or relation candidate, resolves relation
//! endpoints against entities already present in the investigation, and
//! upserts idempotently. One bad record never aborts the batch; problems
//! are collected as per-record error strings.

use crate::cleaning::PropertyCleaner;
use crate::entity::EntityService;
use crate::errors::{CoreError, CoreResult};
use crate::graph::{GraphStatement, InvestigationGraph};
use crate::types::{EntityCreate, EntityUpdate, IngestResult, InvestigationId, PropertyMap};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Endpoint slot pairs per relation schema, primary pair first.
pub const RELATION_ENDPOINT_CANDIDATES: [(&str, &[(&str, &str)]); 9] = [
    ("Ownership", &[("owner", "asset"), ("source", "target")]),
    ("Directorship", &[("director", "organization"), ("person", "organization")]),
    ("Employment", &[("employee", "employer"), ("person", "organization")]),
    ("Associate", &[("person", "associate")]),
    ("Family", &[("person", "relative")]),
    ("Membership", &[("member", "organization"), ("person", "organization")]),
    ("Representation", &[("agent", "client"), ("source", "target")]),
    ("Payment", &[("payer", "beneficiary"), ("seller", "buyer")]),
    ("UnknownLink", &[("subject", "object"), ("source", "target")]),
];

/// Fallback pairs tried when none of a schema's own slots are filled.
pub const GENERIC_ENDPOINT_CANDIDATES: [(&str, &str); 6] = [
    ("subject", "object"),
    ("source", "target"),
    ("owner", "asset"),
    ("employee", "employer"),
    ("person", "organization"),
    ("seller", "buyer"),
];

/// Property aliases rewritten to the canonical slot, applied only when the
/// canonical slot is absent.
const RELATION_PROPERTY_ALIASES: [(&str, &[(&str, &str)]); 7] = [
    ("Employment", &[("person", "employee"), ("organization", "employer")]),
    ("Directorship", &[("person", "director")]),
    ("Membership", &[("person", "member")]),
    ("Ownership", &[("source", "owner"), ("target", "asset")]),
    ("Representation", &[("source", "agent"), ("target", "client")]),
    ("Payment", &[("seller", "payer"), ("buyer", "beneficiary")]),
    ("UnknownLink", &[("source", "subject"), ("target", "object")]),
];

const SUPPORTED_EXTENSIONS: [&str; 4] = [".ftm", ".ijson", ".json", ".ndjson"];

/// Endpoint slot pairs for a relation schema; `None` marks a node schema.
pub fn relation_slots(schema: &str) -> Option<&'static [(&'static str, &'static str)]> {
    RELATION_ENDPOINT_CANDIDATES
        .iter()
        .find(|(name, _)| *name == schema)
        .map(|(_, slots)| *slots)
}

/// A parsed record, classified by whether its schema names a relation.
#[derive(Debug, Clone)]
pub enum FtmRecord {
    Node {
        id: Option<String>,
        schema: String,
        properties: PropertyMap,
    },
    Relation {
        id: Option<String>,
        schema: String,
        properties: PropertyMap,
        slots: &'static [(&'static str, &'static str)],
    },
}

impl FtmRecord {
    pub fn classify(id: Option<String>, schema: String, properties: PropertyMap) -> Self {
        match relation_slots(&schema) {
            Some(slots) => Self::Relation {
                id,
                schema,
                properties,
                slots,
            },
            None => Self::Node {
                id,
                schema,
                properties,
            },
        }
    }
}

/// A relation whose endpoints resolved to entities in the graph.
#[derive(Debug, Clone)]
struct EdgeCandidate {
    edge_id: String,
    schema: String,
    source: String,
    target: String,
    left_key: String,
    right_key: String,
    properties: PropertyMap,
}

/// Parse and persist uploaded FTM files.
pub struct IngestService {
    entity_service: Arc<EntityService>,
    cleaner: PropertyCleaner,
}

impl IngestService {
    pub fn new(entity_service: Arc<EntityService>) -> Self {
        Self {
            entity_service,
            cleaner: PropertyCleaner::new(),
        }
    }

    pub fn entity_service(&self) -> &Arc<EntityService> {
        &self.entity_service
    }

    /// Ingest a supported FTM JSON file into the investigation graph.
    pub async fn ingest_file(
        &self,
        investigation: &InvestigationId,
        filename: &str,
        content: &[u8],
    ) -> CoreResult<IngestResult> {
        Self::validate_extension(filename)?;
        let records = Self::parse_records(content)?;
        info!(
            "Ingesting {} records from {} into {}",
            records.len(),
            filename,
            investigation
        );
        self.ingest_records(investigation, records).await
    }

    /// Run the per-record pipeline over already-parsed JSON values.
    pub async fn ingest_records(
        &self,
        investigation: &InvestigationId,
        records: Vec<serde_json::Value>,
    ) -> CoreResult<IngestResult> {
        let graph = self.entity_service.graph(investigation);
        let mut processed = 0usize;
        let mut nodes_created = 0usize;
        let mut edges_created = 0usize;
        let mut errors: Vec<String> = Vec::new();
        let mut ref_cache: HashMap<String, String> = HashMap::new();

        for (index, value) in records.into_iter().enumerate() {
            let idx = index + 1;
            processed += 1;

            let Some(object) = value.as_object() else {
                errors.push(format!("Record {idx}: not a JSON object"));
                continue;
            };
            let schema = object
                .get("schema")
                .and_then(|value| value.as_str())
                .unwrap_or("")
                .trim()
                .to_string();
            if schema.is_empty() {
                errors.push(format!("Record {idx}: missing schema"));
                continue;
            }

            let properties = match object.get("properties") {
                None => PropertyMap::new(),
                Some(serde_json::Value::Object(map)) => json_object_to_properties(map),
                Some(_) => {
                    errors.push(format!("Record {idx}: invalid properties"));
                    continue;
                }
            };
            let properties = self.cleaner.clean(&properties);

            let entity_id = object
                .get("id")
                .map(json_value_to_string)
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty());

            match FtmRecord::classify(entity_id, schema, properties) {
                FtmRecord::Relation {
                    id,
                    schema,
                    properties,
                    slots,
                } => {
                    let normalized = Self::normalize_relation_properties(&schema, properties);
                    let candidate = self
                        .edge_candidate(&graph, idx, &schema, id, normalized, slots, &mut ref_cache)
                        .await?;
                    match candidate {
                        Some(candidate) => {
                            match self.create_edge(&graph, candidate).await {
                                Ok(true) => edges_created += 1,
                                Ok(false) => {
                                    errors.push(format!("Record {idx}: could not create edge"))
                                }
                                Err(err) => errors.push(format!("Record {idx}: {err}")),
                            }
                        }
                        None => {
                            errors.push(format!("Record {idx}: unresolved relation endpoints"))
                        }
                    }
                }
                FtmRecord::Node {
                    id,
                    schema,
                    properties,
                } => {
                    let (created, mut upsert_errors) = self
                        .upsert_node(investigation, idx, id, schema, properties)
                        .await;
                    nodes_created += created;
                    errors.append(&mut upsert_errors);
                }
            }
        }

        Ok(IngestResult::new(
            processed,
            nodes_created,
            edges_created,
            errors,
        ))
    }

    /// Resolve an entity reference: the per-file cache first, then by id,
    /// then by case-insensitive first name value.
    pub async fn resolve_entity_ref(
        graph: &Arc<dyn InvestigationGraph>,
        token: &str,
        cache: &mut HashMap<String, String>,
    ) -> CoreResult<Option<String>> {
        let reference = token.trim();
        if reference.is_empty() {
            return Ok(None);
        }

        let folded = reference.to_lowercase();
        if let Some(cached) = cache.get(&folded) {
            return Ok(Some(cached.clone()));
        }

        let by_id = graph
            .run(GraphStatement::GetNode {
                id: reference.to_string(),
            })
            .await?;
        if let Some(entity) = by_id
            .first()
            .and_then(|row| row.first())
            .and_then(|value| value.as_node())
        {
            let resolved = entity.id.clone();
            cache.insert(folded, resolved.clone());
            return Ok(Some(resolved));
        }

        let by_name = graph
            .run(GraphStatement::FindNodeIdByName {
                name: reference.to_string(),
            })
            .await?;
        if let Some(resolved) = by_name
            .first()
            .and_then(|row| row.first())
            .and_then(|value| value.as_text())
        {
            cache.insert(folded, resolved.to_string());
            return Ok(Some(resolved.to_string()));
        }
        Ok(None)
    }

    #[allow(clippy::too_many_arguments)]
    async fn edge_candidate(
        &self,
        graph: &Arc<dyn InvestigationGraph>,
        idx: usize,
        schema: &str,
        entity_id: Option<String>,
        properties: PropertyMap,
        slots: &'static [(&'static str, &'static str)],
        ref_cache: &mut HashMap<String, String>,
    ) -> CoreResult<Option<EdgeCandidate>> {
        let Some((left_key, right_key, left, right)) = Self::edge_endpoints(&properties, slots)
        else {
            return Ok(None);
        };

        let source = Self::resolve_entity_ref(graph, &left, ref_cache).await?;
        let target = Self::resolve_entity_ref(graph, &right, ref_cache).await?;
        let (Some(source), Some(target)) = (source, target) else {
            return Ok(None);
        };

        let edge_id = entity_id.unwrap_or_else(|| format!("edge-{idx}"));
        debug!(
            "Resolved {} relation {} -> {} as edge {}",
            schema, source, target, edge_id
        );
        Ok(Some(EdgeCandidate {
            edge_id,
            schema: schema.to_string(),
            source,
            target,
            left_key,
            right_key,
            properties,
        }))
    }

    /// First slot pair where both sides carry at least one value; the
    /// schema's own pairs win over the generic fallbacks.
    fn edge_endpoints(
        properties: &PropertyMap,
        slots: &[(&str, &str)],
    ) -> Option<(String, String, String, String)> {
        let pairs = slots
            .iter()
            .chain(GENERIC_ENDPOINT_CANDIDATES.iter());
        for &(left_key, right_key) in pairs {
            let left = properties.first(left_key);
            let right = properties.first(right_key);
            if let (Some(left), Some(right)) = (left, right) {
                return Some((
                    left_key.to_string(),
                    right_key.to_string(),
                    left.to_string(),
                    right.to_string(),
                ));
            }
        }
        None
    }

    fn normalize_relation_properties(schema: &str, properties: PropertyMap) -> PropertyMap {
        let mut normalized = properties;
        let aliases = RELATION_PROPERTY_ALIASES
            .iter()
            .find(|(name, _)| *name == schema)
            .map(|(_, aliases)| *aliases)
            .unwrap_or(&[]);
        for &(alias, canonical) in aliases {
            let alias_values = normalized.values(alias).to_vec();
            if !alias_values.is_empty() && normalized.values(canonical).is_empty() {
                normalized.set(canonical.to_string(), alias_values);
            }
        }
        normalized
    }

    async fn create_edge(
        &self,
        graph: &Arc<dyn InvestigationGraph>,
        mut candidate: EdgeCandidate,
    ) -> CoreResult<bool> {
        candidate
            .properties
            .set(candidate.left_key.clone(), vec![candidate.source.clone()]);
        candidate
            .properties
            .set(candidate.right_key.clone(), vec![candidate.target.clone()]);
        self.entity_service
            .catalog()
            .validate(&candidate.schema, &candidate.properties)?;

        let rows = graph
            .run(GraphStatement::UpsertEdge {
                id: candidate.edge_id,
                schema: candidate.schema,
                source: candidate.source,
                target: candidate.target,
                properties: candidate.properties,
            })
            .await?;
        Ok(!rows.is_empty())
    }

    async fn upsert_node(
        &self,
        investigation: &InvestigationId,
        idx: usize,
        entity_id: Option<String>,
        schema: String,
        properties: PropertyMap,
    ) -> (usize, Vec<String>) {
        let mut errors = Vec::new();
        let create = EntityCreate {
            id: entity_id.clone(),
            schema,
            properties: properties.clone(),
        };
        match self.entity_service.create(investigation, create).await {
            Ok(_) => (1, errors),
            Err(CoreError::Validation(_)) | Err(CoreError::Schema(_)) => {
                let Some(entity_id) = entity_id else {
                    errors.push(format!("Record {idx}: invalid entity payload"));
                    return (0, errors);
                };
                if let Err(err) = self
                    .entity_service
                    .update(investigation, &entity_id, EntityUpdate { properties })
                    .await
                {
                    errors.push(format!("Record {idx}: {err}"));
                }
                (0, errors)
            }
            Err(err) => {
                errors.push(format!("Record {idx}: {err}"));
                (0, errors)
            }
        }
    }

    /// Parse a JSON array or newline-delimited JSON into raw records.
    pub fn parse_records(content: &[u8]) -> CoreResult<Vec<serde_json::Value>> {
        let text = std::str::from_utf8(content)
            .map_err(|_| CoreError::validation("Uploaded file is not valid UTF-8"))?;
        let stripped = text.trim();

        if stripped.starts_with('[') {
            let records: Vec<serde_json::Value> = serde_json::from_str(stripped)
                .map_err(|err| CoreError::validation(format!("Invalid JSON array: {err}")))?;
            return Ok(records);
        }

        let mut records = Vec::new();
        for (line_number, raw_line) in stripped.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            let record: serde_json::Value = serde_json::from_str(line).map_err(|err| {
                CoreError::validation(format!("Invalid JSON on line {}: {err}", line_number + 1))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn validate_extension(filename: &str) -> CoreResult<()> {
        let extension = Path::new(filename)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()));
        if let Some(extension) = extension {
            if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
                return Err(CoreError::validation(format!(
                    "Unsupported file extension '{extension}'. Supported: {}",
                    SUPPORTED_EXTENSIONS.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Coerce a JSON object into a multi-valued property map: lists keep their
/// order, scalars become single-value lists, nulls read as empty.
pub fn json_object_to_properties(
    object: &serde_json::Map<String, serde_json::Value>,
) -> PropertyMap {
    let mut properties = PropertyMap::new();
    for (key, value) in object {
        let values = match value {
            serde_json::Value::Null => Vec::new(),
            serde_json::Value::Array(items) => items
                .iter()
                .filter(|item| !item.is_null())
                .map(json_value_to_string)
                .collect(),
            other => vec![json_value_to_string(other)],
        };
        properties.set(key.clone(), values);
    }
    properties
}

fn json_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
