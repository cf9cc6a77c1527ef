//! S3-compatible document storage for Casefile.
//!
//! Each investigation gets its own bucket; objects are keyed
//! `{document_id}/{filename}`. Works against AWS S3 and the usual
//! compatible providers (MinIO, RustFS, LocalStack) via path-style
//! addressing.

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use blake2::digest::{Update, VariableOutput};
use blake2::Blake2sVar;
use casefile_core::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const BUCKET_MIN_LENGTH: usize = 3;
const BUCKET_MAX_LENGTH: usize = 63;
const BUCKET_HASH_LENGTH: usize = 10;
const BUCKET_PREFIX_MAX: usize = 52;

/// Error codes a head-bucket probe may answer with when the bucket is
/// simply absent. Some S3-compatible providers answer 403 instead of 404.
const ABSENT_BUCKET_CODES: [&str; 5] = ["403", "404", "NoSuchBucket", "NotFound", "AccessDenied"];

/// Connection settings for the object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Endpoint host or URL; a bare host is prefixed per `secure`.
    pub endpoint: String,
    pub access_key: String,
    /// Falls back to the access key when empty (single-credential dev
    /// setups).
    pub secret_key: Option<String>,
    pub region: String,
    /// Bucket name prefix; the investigation id is appended.
    pub bucket_prefix: String,
    pub secure: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            access_key: "rustfsadmin".to_string(),
            secret_key: None,
            region: "us-east-1".to_string(),
            bucket_prefix: "documents".to_string(),
            secure: false,
        }
    }
}

impl S3Config {
    fn endpoint_url(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            return self.endpoint.clone();
        }
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}", self.endpoint)
    }
}

/// Deterministic bucket name for an investigation: lowercased, squashed to
/// the S3 charset, padded to the minimum, and digest-truncated past the
/// maximum.
pub fn bucket_name_for(bucket_prefix: &str, investigation_id: &str) -> String {
    let raw = format!("{bucket_prefix}-{investigation_id}").to_lowercase();
    let mut cleaned = String::with_capacity(raw.len());
    let mut last_dash = false;
    for ch in raw.chars() {
        let mapped = if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '.' || ch == '-' {
            ch
        } else {
            '-'
        };
        if mapped == '-' {
            if !last_dash {
                cleaned.push('-');
            }
            last_dash = true;
        } else {
            cleaned.push(mapped);
            last_dash = false;
        }
    }
    let mut cleaned = cleaned
        .trim_matches(|ch| ch == '-' || ch == '.')
        .to_string();

    if cleaned.len() < BUCKET_MIN_LENGTH {
        cleaned = format!("{}-inv", bucket_prefix.to_lowercase());
    }
    if cleaned.len() > BUCKET_MAX_LENGTH {
        let digest = short_digest(&cleaned);
        let head: String = cleaned.chars().take(BUCKET_PREFIX_MAX).collect();
        cleaned = format!("{}-{digest}", head.trim_end_matches('-'));
    }
    cleaned
}

fn short_digest(input: &str) -> String {
    let mut buffer = [0u8; 8];
    if let Ok(mut hasher) = Blake2sVar::new(buffer.len()) {
        hasher.update(input.as_bytes());
        if hasher.finalize_variable(&mut buffer).is_ok() {
            let hex: String = buffer.iter().map(|byte| format!("{byte:02x}")).collect();
            return hex.chars().take(BUCKET_HASH_LENGTH).collect();
        }
    }
    // Hashing a short fixed buffer cannot realistically fail; fall back to
    // a stable filler so the name stays within bounds regardless.
    "0".repeat(BUCKET_HASH_LENGTH)
}

/// S3 implementation of the [`ObjectStore`] trait.
pub struct S3ObjectStore {
    client: Client,
    config: S3Config,
}

impl S3ObjectStore {
    pub fn new(config: S3Config) -> Self {
        let secret_key = config
            .secret_key
            .clone()
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| config.access_key.clone());
        let credentials =
            Credentials::new(config.access_key.clone(), secret_key, None, None, "casefile");
        let sdk_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(config.endpoint_url())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        info!("Object store targeting {}", config.endpoint_url());
        Self {
            client: Client::from_conf(sdk_config),
            config,
        }
    }

    fn bucket_for(&self, investigation: &InvestigationId) -> String {
        bucket_name_for(&self.config.bucket_prefix, investigation.as_str())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if !self.config.region.is_empty() && self.config.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(
                        self.config.region.as_str(),
                    ))
                    .build(),
            );
        }
        match request.send().await {
            Ok(_) => {
                info!("Created bucket {}", bucket);
                Ok(())
            }
            Err(err) => {
                let code = err.code().unwrap_or_default();
                if code == "BucketAlreadyOwnedByYou" || code == "BucketAlreadyExists" {
                    return Ok(());
                }
                Err(StorageError::new(format!(
                    "failed to create bucket '{bucket}': {err}"
                )))
            }
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn ensure_bucket(&self, investigation: &InvestigationId) -> Result<String, StorageError> {
        let bucket = self.bucket_for(investigation);
        match self.client.head_bucket().bucket(&bucket).send().await {
            Ok(_) => return Ok(bucket),
            Err(err) => {
                let code = err.code().unwrap_or_default().to_string();
                if !ABSENT_BUCKET_CODES.contains(&code.as_str()) {
                    return Err(StorageError::new(format!(
                        "failed to probe bucket '{bucket}': {err}"
                    )));
                }
                debug!("Bucket {} absent ({}), creating", bucket, code);
            }
        }
        self.create_bucket(&bucket).await?;
        Ok(bucket)
    }

    async fn upload(
        &self,
        investigation: &InvestigationId,
        document_id: &str,
        filename: &str,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<String, StorageError> {
        let bucket = self.ensure_bucket(investigation).await?;
        let safe_filename = if filename.is_empty() { "upload.bin" } else { filename };
        let key = format!("{document_id}/{safe_filename}");

        self.client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .body(ByteStream::from(content.to_vec()))
            .content_type(content_type.unwrap_or("application/octet-stream"))
            .metadata("investigation_id", investigation.as_str())
            .metadata("document_id", document_id)
            .metadata("filename", safe_filename)
            .send()
            .await
            .map_err(|err| {
                StorageError::new(format!("failed to upload '{key}' to '{bucket}': {err}"))
            })?;
        debug!("Uploaded {} bytes to {}/{}", content.len(), bucket, key);
        Ok(key)
    }

    async fn download(
        &self,
        investigation: &InvestigationId,
        key: &str,
    ) -> Result<Vec<u8>, StorageError> {
        let bucket = self.bucket_for(investigation);
        let output = self
            .client
            .get_object()
            .bucket(&bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                StorageError::new(format!("failed to download '{key}' from '{bucket}': {err}"))
            })?;
        let bytes = output.body.collect().await.map_err(|err| {
            StorageError::new(format!("failed to read object body '{key}': {err}"))
        })?;
        Ok(bytes.into_bytes().to_vec())
    }

    fn object_url(&self, investigation: &InvestigationId, key: &str) -> String {
        format!("s3://{}/{}", self.bucket_for(investigation), key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids_stay_readable() {
        assert_eq!(bucket_name_for("documents", "x"), "documents-x");
        assert_eq!(bucket_name_for("documents", "abc-123"), "documents-abc-123");
    }

    #[test]
    fn names_are_lowercased_and_squashed() {
        assert_eq!(
            bucket_name_for("documents", "Inv_2024//March"),
            "documents-inv-2024-march"
        );
    }

    #[test]
    fn degenerate_ids_fall_back_to_the_prefix() {
        assert_eq!(bucket_name_for("d", "_"), "d-inv");
    }

    #[test]
    fn long_ids_truncate_with_digest_suffix() {
        let name = bucket_name_for("documents", &"A".repeat(100));
        assert_eq!(name.len(), BUCKET_MAX_LENGTH);
        let (head, tail) = name.split_at(BUCKET_PREFIX_MAX);
        assert!(!head.ends_with('-'));
        assert!(tail.starts_with('-'));
        let digest = &tail[1..];
        assert_eq!(digest.len(), BUCKET_HASH_LENGTH);
        assert!(digest.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn naming_is_deterministic() {
        let id = "Case File #42 (fraud)";
        assert_eq!(
            bucket_name_for("documents", id),
            bucket_name_for("documents", id)
        );
    }

    #[test]
    fn output_always_satisfies_bucket_constraints() {
        for id in ["x", "--..--", &"z".repeat(400), "UPPER CASE", "émoji🙂"] {
            let name = bucket_name_for("documents", id);
            assert!(name.len() >= BUCKET_MIN_LENGTH, "{name}");
            assert!(name.len() <= BUCKET_MAX_LENGTH, "{name}");
            assert!(!name.starts_with('-') && !name.ends_with('-'), "{name}");
            assert!(
                name.chars()
                    .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '.'),
                "{name}"
            );
        }
    }

    // Integration coverage requires a live S3-compatible endpoint.
    // To run: start MinIO/RustFS locally and `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore = "requires an S3-compatible endpoint"]
    async fn upload_download_round_trip() {
        let store = S3ObjectStore::new(S3Config::default());
        let inv = InvestigationId::new("it-tests");
        let key = store
            .upload(&inv, "doc-1", "a.txt", b"payload", Some("text/plain"))
            .await
            .unwrap();
        let bytes = store.download(&inv, &key).await.unwrap();
        assert_eq!(bytes, b"payload");
    }
}
