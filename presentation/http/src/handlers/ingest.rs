//! Upload ingestion and extraction-status routes.
//!
//! Structured FTM files run through the synchronous ingestor; anything
//! else becomes a `Document` entity, lands in object storage, and starts
//! the durable extraction workflow.

use crate::{bad_request, error_response, ApiError, AppState};
use axum::extract::{Multipart, Path, State};
use axum::response::Json;
use casefile_core::prelude::*;
use tracing::info;

const FTM_EXTENSIONS: [&str; 4] = [".ftm", ".ijson", ".json", ".ndjson"];

fn extension_of(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub async fn ingest_file(
    State(state): State<AppState>,
    Path(investigation_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<IngestResult>, ApiError> {
    let mut upload: Option<(String, Option<String>, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(format!("Invalid multipart payload: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload.bin".to_string());
        let content_type = field.content_type().map(str::to_string);
        let content = field
            .bytes()
            .await
            .map_err(|err| bad_request(format!("Failed to read upload: {err}")))?;
        upload = Some((filename, content_type, content.to_vec()));
        break;
    }

    let Some((filename, content_type, content)) = upload else {
        return Err(bad_request("Missing 'file' field in multipart upload"));
    };
    if content.is_empty() {
        return Err(bad_request("Uploaded file is empty"));
    }

    let investigation = InvestigationId::new(investigation_id);
    let extension = extension_of(&filename);

    if FTM_EXTENSIONS.contains(&extension.as_str()) {
        let result = state
            .ingest
            .ingest_file(&investigation, &filename, &content)
            .await
            .map_err(error_response)?;
        return Ok(Json(result));
    }

    // Binary document: register it, store the bytes, and hand off to the
    // durable extraction pipeline.
    let document = state
        .entities
        .create(
            &investigation,
            EntityCreate {
                id: None,
                schema: "Document".to_string(),
                properties: [
                    ("fileName".to_string(), vec![filename.clone()]),
                    (
                        "mimeType".to_string(),
                        vec![content_type
                            .clone()
                            .unwrap_or_else(|| "application/octet-stream".to_string())],
                    ),
                    ("extension".to_string(), vec![extension]),
                    ("processingStatus".to_string(), vec!["queued".to_string()]),
                ]
                .into_iter()
                .collect(),
            },
        )
        .await
        .map_err(error_response)?;

    let storage_key = state
        .object_store
        .upload(
            &investigation,
            &document.id,
            &filename,
            &content,
            content_type.as_deref(),
        )
        .await
        .map_err(|err| error_response(err.into()))?;

    let workflow_id = state
        .workflows
        .enqueue(WorkflowRequest {
            investigation_id: investigation.to_string(),
            document_id: document.id.clone(),
            storage_key,
            filename: filename.clone(),
            content_type,
        })
        .await
        .map_err(error_response)?;
    info!(
        "Queued extraction workflow {} for document {} ({})",
        workflow_id, document.id, filename
    );

    Ok(Json(IngestResult {
        processed: 1,
        nodes_created: 1,
        edges_created: 0,
        errors: Vec::new(),
        status: Some("processing".to_string()),
        workflow_id: Some(workflow_id),
        message: Some("Document uploaded and extraction workflow started".to_string()),
    }))
}

pub async fn extraction_status(
    State(state): State<AppState>,
    Path((_investigation_id, workflow_id)): Path<(String, String)>,
) -> Result<Json<ExtractionStatus>, ApiError> {
    let status = state
        .workflows
        .get_status(&workflow_id)
        .await
        .map_err(error_response)?;
    Ok(Json(status))
}
