//! In-memory object store mirroring the S3 adapter's key scheme.

use async_trait::async_trait;
use casefile_core::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Buckets = HashMap<String, HashMap<String, Vec<u8>>>;

#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    buckets: Arc<Mutex<Buckets>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket_name(investigation: &InvestigationId) -> String {
        format!("documents-{investigation}").to_lowercase()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Buckets>, StorageError> {
        self.buckets
            .lock()
            .map_err(|_| StorageError::new("object store state poisoned"))
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn ensure_bucket(&self, investigation: &InvestigationId) -> Result<String, StorageError> {
        let name = Self::bucket_name(investigation);
        let mut buckets = self.lock()?;
        buckets.entry(name.clone()).or_default();
        Ok(name)
    }

    async fn upload(
        &self,
        investigation: &InvestigationId,
        document_id: &str,
        filename: &str,
        content: &[u8],
        _content_type: Option<&str>,
    ) -> Result<String, StorageError> {
        let bucket = self.ensure_bucket(investigation).await?;
        let safe_filename = if filename.is_empty() { "upload.bin" } else { filename };
        let key = format!("{document_id}/{safe_filename}");
        let mut buckets = self.lock()?;
        buckets
            .entry(bucket)
            .or_default()
            .insert(key.clone(), content.to_vec());
        Ok(key)
    }

    async fn download(
        &self,
        investigation: &InvestigationId,
        key: &str,
    ) -> Result<Vec<u8>, StorageError> {
        let bucket = Self::bucket_name(investigation);
        let buckets = self.lock()?;
        buckets
            .get(&bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| StorageError::new(format!("object '{key}' not found in '{bucket}'")))
    }

    fn object_url(&self, investigation: &InvestigationId, key: &str) -> String {
        format!("s3://{}/{}", Self::bucket_name(investigation), key)
    }
}
