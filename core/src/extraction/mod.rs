//! Document extraction: parsing and the durable workflow pipeline.

pub mod document;
pub mod workflow;

pub use document::DocumentParser;
pub use workflow::ExtractionWorkflowService;
