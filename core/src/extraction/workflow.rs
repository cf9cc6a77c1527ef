//! Durable four-step document extraction pipeline.
//!
//! Download, parse, extract, persist: every step output is written to a
//! [`StepStore`] before the pipeline advances. A restarted or retried
//! workflow replays completed steps from the store instead of re-running
//! them, so only persistence has to be idempotent on its own. It is,
//! because node and edge ids are derived deterministically from the
//! document and collisions degrade to updates.

use crate::entity::EntityService;
use crate::errors::{CoreError, CoreResult};
use crate::graph::GraphStatement;
use crate::ingest::IngestService;
use crate::traits::{
    EntityExtractor, ObjectStore, StepStore, WorkflowRecord, WorkflowRequest,
};
use crate::types::{
    EntityCreate, EntityUpdate, ExtractionCandidate, ExtractionStatus, InvestigationId,
    ParsedDocument, WorkflowStatus,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::document::DocumentParser;
use crate::ingest::relation_slots;

pub const STEP_DOWNLOAD: &str = "download";
pub const STEP_PARSE: &str = "parse";
pub const STEP_EXTRACT: &str = "extract";
pub const STEP_PERSIST: &str = "persist";

/// Result of the persistence step, also the workflow's final result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistSummary {
    pub processed: usize,
    pub nodes_created: usize,
    pub edges_created: usize,
    pub errors: Vec<String>,
    pub document_id: String,
}

/// Submit and inspect durable extraction workflows.
pub struct ExtractionWorkflowService {
    entity_service: Arc<EntityService>,
    object_store: Arc<dyn ObjectStore>,
    parser: DocumentParser,
    extractor: Arc<dyn EntityExtractor>,
    step_store: Arc<dyn StepStore>,
}

impl ExtractionWorkflowService {
    pub fn new(
        entity_service: Arc<EntityService>,
        object_store: Arc<dyn ObjectStore>,
        extractor: Arc<dyn EntityExtractor>,
        step_store: Arc<dyn StepStore>,
    ) -> Self {
        Self {
            entity_service,
            object_store,
            parser: DocumentParser::new(),
            extractor,
            step_store,
        }
    }

    /// Persist a pending workflow row and start the runner. Returns the
    /// client-visible workflow id.
    pub async fn enqueue(self: &Arc<Self>, request: WorkflowRequest) -> CoreResult<String> {
        let workflow_id = Uuid::new_v4().to_string();
        let record = WorkflowRecord {
            workflow_id: workflow_id.clone(),
            request,
            status: WorkflowStatus::Pending,
            result: None,
            error: None,
        };
        self.step_store.create_workflow(&record).await?;
        info!("Enqueued extraction workflow {}", workflow_id);

        let service = Arc::clone(self);
        let spawned_id = workflow_id.clone();
        tokio::spawn(async move {
            service.drive(&spawned_id).await;
        });
        Ok(workflow_id)
    }

    /// Re-spawn workflows that were pending or running when the process
    /// stopped; completed steps replay from the store.
    pub async fn recover(self: &Arc<Self>) -> CoreResult<usize> {
        let incomplete = self.step_store.incomplete_workflows().await?;
        let count = incomplete.len();
        for record in incomplete {
            info!("Recovering extraction workflow {}", record.workflow_id);
            let service = Arc::clone(self);
            tokio::spawn(async move {
                service.drive(&record.workflow_id).await;
            });
        }
        Ok(count)
    }

    /// Workflow state plus result or error when it finished.
    pub async fn get_status(&self, workflow_id: &str) -> CoreResult<ExtractionStatus> {
        match self.step_store.get_workflow(workflow_id).await? {
            Some(record) => Ok(ExtractionStatus {
                workflow_id: record.workflow_id,
                status: record.status,
                result: record.result,
                error: record.error,
            }),
            None => Ok(ExtractionStatus {
                workflow_id: workflow_id.to_string(),
                status: WorkflowStatus::NotFound,
                result: None,
                error: Some("Workflow not found".to_string()),
            }),
        }
    }

    /// Cooperative cancellation: the runner checks the row between steps.
    pub async fn cancel(&self, workflow_id: &str) -> CoreResult<bool> {
        let Some(record) = self.step_store.get_workflow(workflow_id).await? else {
            return Ok(false);
        };
        if matches!(
            record.status,
            WorkflowStatus::Success | WorkflowStatus::Error | WorkflowStatus::Cancelled
        ) {
            return Ok(false);
        }
        self.step_store
            .set_workflow_state(workflow_id, WorkflowStatus::Cancelled, None, None)
            .await?;
        Ok(true)
    }

    async fn drive(&self, workflow_id: &str) {
        match self.run(workflow_id).await {
            Ok(Some(result)) => {
                if let Err(err) = self
                    .step_store
                    .set_workflow_state(workflow_id, WorkflowStatus::Success, Some(result), None)
                    .await
                {
                    error!("Failed to record workflow {} success: {}", workflow_id, err);
                }
            }
            Ok(None) => {
                debug!("Workflow {} stopped before completion", workflow_id);
            }
            Err(err) => {
                warn!("Extraction workflow {} failed: {}", workflow_id, err);
                if let Err(state_err) = self
                    .step_store
                    .set_workflow_state(
                        workflow_id,
                        WorkflowStatus::Error,
                        None,
                        Some(err.to_string()),
                    )
                    .await
                {
                    error!(
                        "Failed to record workflow {} error: {}",
                        workflow_id, state_err
                    );
                }
            }
        }
    }

    /// Run the pipeline; `Ok(None)` means it was cancelled underway.
    async fn run(&self, workflow_id: &str) -> CoreResult<Option<serde_json::Value>> {
        let Some(record) = self.step_store.get_workflow(workflow_id).await? else {
            return Err(CoreError::not_found(format!(
                "Workflow '{workflow_id}' not found"
            )));
        };
        if record.status == WorkflowStatus::Cancelled {
            return Ok(None);
        }
        let request = record.request;
        self.step_store
            .set_workflow_state(workflow_id, WorkflowStatus::Running, None, None)
            .await?;

        let content = self.download_step(workflow_id, &request).await?;
        if self.cancelled(workflow_id).await? {
            return Ok(None);
        }

        let parsed = self.parse_step(workflow_id, &request, &content).await?;
        if self.cancelled(workflow_id).await? {
            return Ok(None);
        }

        let candidates = self.extract_step(workflow_id, &parsed).await?;
        if self.cancelled(workflow_id).await? {
            return Ok(None);
        }

        let summary = self
            .persist_step(workflow_id, &request, &parsed, &candidates)
            .await?;
        let result = serde_json::to_value(&summary)
            .map_err(|err| CoreError::internal(format!("Failed to encode result: {err}")))?;
        Ok(Some(result))
    }

    async fn cancelled(&self, workflow_id: &str) -> CoreResult<bool> {
        Ok(self
            .step_store
            .get_workflow(workflow_id)
            .await?
            .is_some_and(|record| record.status == WorkflowStatus::Cancelled))
    }

    /// Step 1: object bytes out of storage; persisted base64-encoded.
    async fn download_step(
        &self,
        workflow_id: &str,
        request: &WorkflowRequest,
    ) -> CoreResult<Vec<u8>> {
        if let Some(saved) = self.step_store.step_output(workflow_id, STEP_DOWNLOAD).await? {
            if let Some(encoded) = saved.as_str() {
                if let Ok(bytes) = BASE64.decode(encoded) {
                    debug!("Replaying {} for workflow {}", STEP_DOWNLOAD, workflow_id);
                    return Ok(bytes);
                }
            }
        }

        let investigation = InvestigationId::new(request.investigation_id.clone());
        let bytes = self
            .object_store
            .download(&investigation, &request.storage_key)
            .await?;
        let encoded = serde_json::Value::String(BASE64.encode(&bytes));
        self.step_store
            .save_step_output(workflow_id, STEP_DOWNLOAD, &encoded)
            .await?;
        Ok(bytes)
    }

    /// Step 2: plain text and metadata.
    async fn parse_step(
        &self,
        workflow_id: &str,
        request: &WorkflowRequest,
        content: &[u8],
    ) -> CoreResult<ParsedDocument> {
        if let Some(saved) = self.step_store.step_output(workflow_id, STEP_PARSE).await? {
            if let Ok(parsed) = serde_json::from_value::<ParsedDocument>(saved) {
                debug!("Replaying {} for workflow {}", STEP_PARSE, workflow_id);
                return Ok(parsed);
            }
        }

        let parsed = self.parser.parse(
            content,
            &request.filename,
            request.content_type.as_deref(),
        )?;
        let encoded = serde_json::to_value(&parsed)
            .map_err(|err| CoreError::internal(format!("Failed to encode step output: {err}")))?;
        self.step_store
            .save_step_output(workflow_id, STEP_PARSE, &encoded)
            .await?;
        Ok(parsed)
    }

    /// Step 3: LLM candidates.
    async fn extract_step(
        &self,
        workflow_id: &str,
        parsed: &ParsedDocument,
    ) -> CoreResult<Vec<ExtractionCandidate>> {
        if let Some(saved) = self.step_store.step_output(workflow_id, STEP_EXTRACT).await? {
            if let Ok(candidates) = serde_json::from_value::<Vec<ExtractionCandidate>>(saved) {
                debug!("Replaying {} for workflow {}", STEP_EXTRACT, workflow_id);
                return Ok(candidates);
            }
        }

        let candidates = self
            .extractor
            .extract(&parsed.content, parsed.document_type)
            .await?;
        let encoded = serde_json::to_value(&candidates)
            .map_err(|err| CoreError::internal(format!("Failed to encode step output: {err}")))?;
        self.step_store
            .save_step_output(workflow_id, STEP_EXTRACT, &encoded)
            .await?;
        Ok(candidates)
    }

    /// Step 4: merge parsed fields onto the document entity, then persist
    /// the extracted candidates: nodes first, then relations resolved
    /// against the fresh name cache and the graph.
    async fn persist_step(
        &self,
        workflow_id: &str,
        request: &WorkflowRequest,
        parsed: &ParsedDocument,
        candidates: &[ExtractionCandidate],
    ) -> CoreResult<PersistSummary> {
        if let Some(saved) = self.step_store.step_output(workflow_id, STEP_PERSIST).await? {
            if let Ok(summary) = serde_json::from_value::<PersistSummary>(saved) {
                debug!("Replaying {} for workflow {}", STEP_PERSIST, workflow_id);
                return Ok(summary);
            }
        }

        let summary = self.persist(request, parsed, candidates).await?;
        let encoded = serde_json::to_value(&summary)
            .map_err(|err| CoreError::internal(format!("Failed to encode step output: {err}")))?;
        self.step_store
            .save_step_output(workflow_id, STEP_PERSIST, &encoded)
            .await?;
        Ok(summary)
    }

    async fn persist(
        &self,
        request: &WorkflowRequest,
        parsed: &ParsedDocument,
        candidates: &[ExtractionCandidate],
    ) -> CoreResult<PersistSummary> {
        let investigation = InvestigationId::new(request.investigation_id.clone());
        let document_id = request.document_id.clone();

        let existing = self
            .entity_service
            .get(&investigation, &document_id)
            .await?
            .ok_or_else(|| {
                CoreError::validation(format!("Document entity '{document_id}' not found"))
            })?;

        let mut merged = existing.properties.clone();
        merged.set("fileName", vec![request.filename.clone()]);
        merged.set("mimeType", vec![parsed.mime_type.clone()]);
        merged.set("bodyText", vec![parsed.content.clone()]);
        merged.set(
            "sourceUrl",
            vec![self
                .object_store
                .object_url(&investigation, &request.storage_key)],
        );
        merged.set("processingStatus", vec!["completed".to_string()]);
        self.entity_service
            .update(
                &investigation,
                &document_id,
                EntityUpdate { properties: merged },
            )
            .await?;

        let mut nodes_created = 0usize;
        let mut edges_created = 0usize;
        let mut errors: Vec<String> = Vec::new();
        let mut name_to_id: HashMap<String, String> = HashMap::new();

        let (node_candidates, relation_candidates): (Vec<_>, Vec<_>) = candidates
            .iter()
            .partition(|candidate| relation_slots(&candidate.schema).is_none());

        for (index, candidate) in node_candidates.iter().enumerate() {
            let idx = index + 1;
            let schema = candidate.schema.trim();
            if schema.is_empty() {
                errors.push(format!("Entity {idx}: missing schema"));
                continue;
            }
            // Deterministic ids make re-persistence collide instead of
            // duplicating; collisions degrade to an update.
            let entity_id = format!("{document_id}-entity-{idx}");
            let created = self
                .entity_service
                .create(
                    &investigation,
                    EntityCreate {
                        id: Some(entity_id.clone()),
                        schema: schema.to_string(),
                        properties: candidate.properties.clone(),
                    },
                )
                .await;
            match created {
                Ok(entity) => {
                    nodes_created += 1;
                    if let Some(name) = entity.properties.first("name") {
                        name_to_id.insert(name.to_lowercase(), entity.id.clone());
                    }
                }
                Err(CoreError::Validation(message)) if message.contains("already exists") => {
                    let updated = self
                        .entity_service
                        .update(
                            &investigation,
                            &entity_id,
                            EntityUpdate {
                                properties: candidate.properties.clone(),
                            },
                        )
                        .await;
                    match updated {
                        Ok(Some(entity)) => {
                            if let Some(name) = entity.properties.first("name") {
                                name_to_id.insert(name.to_lowercase(), entity.id.clone());
                            }
                        }
                        Ok(None) => errors.push(format!("Entity {idx}: vanished during update")),
                        Err(err) => errors.push(format!("Entity {idx}: {err}")),
                    }
                }
                Err(err) => errors.push(format!("Entity {idx}: {err}")),
            }
        }

        let graph = self.entity_service.graph(&investigation);
        for (index, candidate) in relation_candidates.iter().enumerate() {
            let idx = index + 1;
            let schema = candidate.schema.trim().to_string();
            let slots = relation_slots(&schema).unwrap_or(&[]);

            let mut endpoint_pair = None;
            for &(left_key, right_key) in slots {
                let left = candidate.properties.first(left_key);
                let right = candidate.properties.first(right_key);
                if let (Some(left), Some(right)) = (left, right) {
                    endpoint_pair =
                        Some((left_key, right_key, left.to_string(), right.to_string()));
                    break;
                }
            }
            let Some((left_key, right_key, left_ref, right_ref)) = endpoint_pair else {
                errors.push(format!("Relation {idx}: missing endpoints"));
                continue;
            };

            let source =
                IngestService::resolve_entity_ref(&graph, &left_ref, &mut name_to_id).await?;
            let target =
                IngestService::resolve_entity_ref(&graph, &right_ref, &mut name_to_id).await?;
            let (Some(source), Some(target)) = (source, target) else {
                errors.push(format!(
                    "Relation {idx}: unresolved endpoints ('{left_ref}' -> '{right_ref}')"
                ));
                continue;
            };

            let mut edge_properties = candidate.properties.clone();
            edge_properties.set(left_key.to_string(), vec![source.clone()]);
            edge_properties.set(right_key.to_string(), vec![target.clone()]);
            if edge_properties.values("proof").is_empty() {
                edge_properties.set("proof", vec![document_id.clone()]);
            }

            let edge_id = format!("rel-{document_id}-{idx}");
            let rows = graph
                .run(GraphStatement::UpsertEdge {
                    id: edge_id,
                    schema,
                    source,
                    target,
                    properties: edge_properties,
                })
                .await?;
            match rows.first() {
                Some(row) => {
                    let created = row
                        .get(1)
                        .map(|value| matches!(value, crate::graph::GraphValue::Bool(true)))
                        .unwrap_or(true);
                    if created {
                        edges_created += 1;
                    }
                }
                None => errors.push(format!("Relation {idx}: could not create edge")),
            }
        }

        info!(
            "Persisted document {}: {} nodes, {} edges, {} errors",
            document_id,
            nodes_created,
            edges_created,
            errors.len()
        );
        Ok(PersistSummary {
            processed: 1,
            nodes_created,
            edges_created,
            errors,
            document_id,
        })
    }
}
