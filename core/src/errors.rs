//! Error types for Casefile core operations

use thiserror::Error;

/// Graph store failures. The substrate surfaces every backend problem as a
/// single kind; callers only decide between "retry later" and "give up".
#[derive(Error, Debug)]
#[error("graph store error: {0}")]
pub struct GraphError(pub String);

impl GraphError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Object storage failures (bucket management, upload, download).
#[derive(Error, Debug)]
#[error("object store error: {0}")]
pub struct StorageError(pub String);

impl StorageError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors from LLM extraction connectors.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error from LLM provider: {0}")]
    Api(String),

    #[error("Failed to parse LLM response: {0}")]
    ResponseParse(String),
}

/// Errors from the sanctions enrichment client.
#[derive(Error, Debug)]
#[error("enrichment request failed: {0}")]
pub struct EnrichError(pub String);

impl EnrichError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Notebook persistence failures.
#[derive(Error, Debug)]
pub enum NotebookError {
    #[error("Notebook version conflict")]
    Conflict,

    #[error("Notebook store error: {0}")]
    Store(String),
}

/// Durable workflow executor failures (state persistence, not step logic;
/// step failures are recorded on the workflow row instead).
#[derive(Error, Debug)]
#[error("workflow state error: {0}")]
pub struct WorkflowStateError(pub String);

impl WorkflowStateError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Main error taxonomy for core operations. Each kind maps to exactly one
/// HTTP status class at the presentation boundary.
#[derive(Error, Debug)]
pub enum CoreError {
    /// User input fails a contract (400).
    #[error("{0}")]
    Validation(String),

    /// Entity, investigation or workflow is absent (404).
    #[error("{0}")]
    NotFound(String),

    /// Property/type/schema violation (400).
    #[error("{0}")]
    Schema(String),

    /// Optimistic concurrency or duplicate-id collision (409).
    #[error("{0}")]
    Conflict(String),

    /// A backing service is unreachable or failing (503).
    #[error("{0}")]
    Unavailable(String),

    /// Anything unexpected (500).
    #[error("{0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<GraphError> for CoreError {
    fn from(err: GraphError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<LlmError> for CoreError {
    fn from(err: LlmError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<EnrichError> for CoreError {
    fn from(err: EnrichError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<NotebookError> for CoreError {
    fn from(err: NotebookError) -> Self {
        match err {
            NotebookError::Conflict => Self::Conflict(err.to_string()),
            NotebookError::Store(msg) => Self::Unavailable(msg),
        }
    }
}

impl From<WorkflowStateError> for CoreError {
    fn from(err: WorkflowStateError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type alias for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_errors_map_to_unavailable() {
        let err: CoreError = GraphError::new("connection refused").into();
        assert!(matches!(err, CoreError::Unavailable(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn notebook_conflict_maps_to_conflict() {
        let err: CoreError = NotebookError::Conflict.into();
        assert!(matches!(err, CoreError::Conflict(_)));

        let err: CoreError = NotebookError::Store("pool timeout".into()).into();
        assert!(matches!(err, CoreError::Unavailable(_)));
    }
}
