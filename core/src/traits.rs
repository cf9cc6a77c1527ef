//! Capability traits implemented by the adapter and connector crates.

use crate::errors::{EnrichError, LlmError, NotebookError, StorageError, WorkflowStateError};
use crate::types::{
    DocumentType, ExtractionCandidate, InvestigationId, NotebookCanvas, NotebookDocument,
    SanctionsSearchResponse, WorkflowStatus,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-investigation object storage keyed by `(document_id, filename)`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the investigation's bucket when missing; returns the bucket
    /// name either way.
    async fn ensure_bucket(&self, investigation: &InvestigationId) -> Result<String, StorageError>;

    /// Upload raw bytes and return the object key (`{document_id}/{filename}`).
    async fn upload(
        &self,
        investigation: &InvestigationId,
        document_id: &str,
        filename: &str,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<String, StorageError>;

    /// Download raw bytes by object key.
    async fn download(
        &self,
        investigation: &InvestigationId,
        key: &str,
    ) -> Result<Vec<u8>, StorageError>;

    /// Stable `s3://bucket/key` URI used only for provenance.
    fn object_url(&self, investigation: &InvestigationId, key: &str) -> String;
}

/// Prompt-driven extraction of node and relation candidates from text.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        document_type: DocumentType,
    ) -> Result<Vec<ExtractionCandidate>, LlmError>;
}

/// Notebook persistence with optimistic version-based concurrency.
#[async_trait]
pub trait NotebookStore: Send + Sync {
    /// Current notebook, or a freshly inserted default at version 1.
    async fn get_or_create(
        &self,
        investigation: &InvestigationId,
    ) -> Result<NotebookDocument, NotebookError>;

    /// Compare-and-set save: bumps the version only when `expected_version`
    /// matches, otherwise fails with [`NotebookError::Conflict`].
    async fn save(
        &self,
        investigation: &InvestigationId,
        expected_version: i32,
        canvas_doc: NotebookCanvas,
    ) -> Result<NotebookDocument, NotebookError>;
}

/// Everything the workflow engine needs to start one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub investigation_id: String,
    pub document_id: String,
    pub storage_key: String,
    pub filename: String,
    pub content_type: Option<String>,
}

/// One persisted workflow row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub workflow_id: String,
    pub request: WorkflowRequest,
    pub status: WorkflowStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Durable state for the step executor. Step outputs are retained between
/// retries so a restarted workflow replays from the last completed step.
#[async_trait]
pub trait StepStore: Send + Sync {
    /// Insert a new workflow row in `Pending` state.
    async fn create_workflow(&self, record: &WorkflowRecord) -> Result<(), WorkflowStateError>;

    async fn get_workflow(
        &self,
        workflow_id: &str,
    ) -> Result<Option<WorkflowRecord>, WorkflowStateError>;

    /// Update status plus optional result/error payloads.
    async fn set_workflow_state(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<(), WorkflowStateError>;

    /// Workflows that were pending or running when the process stopped.
    async fn incomplete_workflows(&self) -> Result<Vec<WorkflowRecord>, WorkflowStateError>;

    /// Persisted output of a completed step, if any.
    async fn step_output(
        &self,
        workflow_id: &str,
        step_name: &str,
    ) -> Result<Option<serde_json::Value>, WorkflowStateError>;

    /// Record a step's output; keyed by `(workflow_id, step_name)`.
    async fn save_step_output(
        &self,
        workflow_id: &str,
        step_name: &str,
        output: &serde_json::Value,
    ) -> Result<(), WorkflowStateError>;
}

/// External sanctions-list service (Yente/OpenSanctions shaped).
#[async_trait]
pub trait SanctionsClient: Send + Sync {
    /// Full-text search over the configured dataset.
    async fn search(&self, query: &str, limit: usize)
        -> Result<SanctionsSearchResponse, EnrichError>;

    /// Every entity id reachable through the service's adjacency payload
    /// for the given id, the id itself excluded, sorted.
    async fn adjacent_entity_ids(&self, entity_id: &str) -> Result<Vec<String>, EnrichError>;
}
