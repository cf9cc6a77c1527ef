//! Core types, traits and services for the Casefile investigation backend.
//!
//! An investigation is the tenancy boundary: one property graph, one object
//! storage bucket, one notebook. This crate holds the data model, the error
//! taxonomy, the capability traits the adapter crates implement, and the
//! services that run on top of them: entity CRUD/merge, FTM ingestion,
//! schema validation, property cleaning, the durable extraction workflow,
//! and enrichment linking.

pub mod cleaning;
pub mod enrich;
pub mod entity;
pub mod errors;
pub mod extraction;
pub mod graph;
pub mod ingest;
pub mod investigation;
pub mod schema;
pub mod traits;
pub mod types;

/// Convenience re-exports for adapter and presentation crates.
pub mod prelude {
    pub use crate::cleaning::PropertyCleaner;
    pub use crate::enrich::EnrichmentService;
    pub use crate::entity::EntityService;
    pub use crate::errors::{
        CoreError, CoreResult, EnrichError, GraphError, GraphResult, LlmError, NotebookError,
        StorageError, WorkflowStateError,
    };
    pub use crate::extraction::workflow::PersistSummary;
    pub use crate::extraction::{DocumentParser, ExtractionWorkflowService};
    pub use crate::graph::{
        graph_name, relation_type, GraphStatement, GraphStore, GraphValue, InvestigationGraph,
        Row, INVESTIGATION_GRAPH_PREFIX, META_GRAPH_NAME,
    };
    pub use crate::ingest::{relation_slots, FtmRecord, IngestService};
    pub use crate::investigation::InvestigationService;
    pub use crate::schema::{PropertyType, SchemaCatalog, SchemaDetail, SchemaInfo, SchemaProperty};
    pub use crate::traits::{
        EntityExtractor, NotebookStore, ObjectStore, SanctionsClient, StepStore, WorkflowRecord,
        WorkflowRequest,
    };
    pub use crate::types::*;
}
