//! Object-storage publisher
//!
//! Writes finished archives to an S3-compatible bucket (AWS S3 or
//! DigitalOcean Spaces) under deterministic keys, so a retried job overwrites
//! its own key instead of duplicating output. Uploads stream from disk; the
//! SHA-256 checksum is computed in a blocking task alongside.

use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use chrono::NaiveDate;
use rede_common::types::JurisdictionCode;
use rede_common::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

/// Destination bucket configuration, read from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub path_style: bool,
}

impl StorageConfig {
    /// Read settings from `REDE_S3_*` variables, falling back to the
    /// conventional AWS names for credentials.
    pub fn from_env() -> Result<Self> {
        let access_key = std::env::var("REDE_S3_ACCESS_KEY")
            .or_else(|_| std::env::var("AWS_ACCESS_KEY_ID"))
            .map_err(|_| PipelineError::Config("REDE_S3_ACCESS_KEY is not set".to_string()))?;
        let secret_key = std::env::var("REDE_S3_SECRET_KEY")
            .or_else(|_| std::env::var("AWS_SECRET_ACCESS_KEY"))
            .map_err(|_| PipelineError::Config("REDE_S3_SECRET_KEY is not set".to_string()))?;
        let bucket = std::env::var("REDE_S3_BUCKET")
            .map_err(|_| PipelineError::Config("REDE_S3_BUCKET is not set".to_string()))?;

        Ok(Self {
            endpoint: std::env::var("REDE_S3_ENDPOINT").ok(),
            region: std::env::var("REDE_S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            bucket,
            access_key,
            secret_key,
            path_style: std::env::var("REDE_S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        })
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedObject {
    pub key: String,
    pub size: u64,
    pub checksum: String,
}

/// Uploads finished artifacts to the destination bucket.
#[derive(Clone)]
pub struct Publisher {
    client: Client,
    bucket: String,
}

impl Publisher {
    pub fn new(config: StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "rede-publisher",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!(bucket = %config.bucket, "publisher initialized");

        Self {
            client,
            bucket: config.bucket,
        }
    }

    /// Upload a local artifact under `key`.
    ///
    /// Safely retryable: the put overwrites whatever is at the key, and a
    /// retried job reproduces the same key.
    pub async fn publish(&self, local_artifact: &Path, key: &str) -> Result<PublishedObject> {
        let size = tokio::fs::metadata(local_artifact).await?.len();

        debug!(
            "uploading {} bytes to s3://{}/{}",
            size, self.bucket, key
        );

        let checksum = {
            let path = local_artifact.to_path_buf();
            tokio::task::spawn_blocking(move || sha256_file(&path))
                .await
                .map_err(|e| PipelineError::Publish {
                    key: key.to_string(),
                    reason: format!("checksum task panicked: {}", e),
                })??
        };

        let body = ByteStream::from_path(local_artifact)
            .await
            .map_err(|e| PipelineError::Publish {
                key: key.to_string(),
                reason: format!("cannot read {}: {}", local_artifact.display(), e),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_length(size as i64)
            .content_type("application/zip")
            .send()
            .await
            .map_err(|e| PipelineError::Publish {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        info!("published s3://{}/{} ({} bytes)", self.bucket, key, size);

        Ok(PublishedObject {
            key: key.to_string(),
            size,
            checksum,
        })
    }

    /// Check whether an object already exists at `key`.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let text = e.to_string();
                if text.contains("NotFound") || text.contains("404") {
                    Ok(false)
                } else {
                    Err(PipelineError::Publish {
                        key: key.to_string(),
                        reason: text,
                    })
                }
            },
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// File basename for one published artifact:
/// `{dataset}_filtered_{CODE}_{YYYYMMDD}.{ext}`.
pub fn destination_basename(
    dataset: &str,
    jurisdiction: &JurisdictionCode,
    date: NaiveDate,
    ext: &str,
) -> String {
    format!(
        "{}_filtered_{}_{}.{}",
        dataset,
        jurisdiction,
        date.format("%Y%m%d"),
        ext
    )
}

/// Full destination key: `{prefix/}{YYYY-MM-DD}/{basename}`.
///
/// Downstream consumers depend on this exact shape; change nothing here
/// without coordinating with them.
pub fn object_key(prefix: Option<&str>, date: NaiveDate, basename: &str) -> String {
    match prefix {
        Some(prefix) => format!(
            "{}/{}/{}",
            prefix.trim_matches('/'),
            date.format("%Y-%m-%d"),
            basename
        ),
        None => format!("{}/{}", date.format("%Y-%m-%d"), basename),
    }
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn code(s: &str) -> JurisdictionCode {
        JurisdictionCode::new(s).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 7).unwrap()
    }

    #[test]
    fn test_destination_basename_format() {
        assert_eq!(
            destination_basename("taxassessor", &code("CA"), date(), "zip"),
            "taxassessor_filtered_CA_20260807.zip"
        );
    }

    #[test]
    fn test_object_key_without_prefix() {
        let basename = destination_basename("taxassessor", &code("CA"), date(), "zip");
        assert_eq!(
            object_key(None, date(), &basename),
            "2026-08-07/taxassessor_filtered_CA_20260807.zip"
        );
    }

    #[test]
    fn test_object_key_with_prefix() {
        assert_eq!(
            object_key(Some("parcel-extracts"), date(), "x.zip"),
            "parcel-extracts/2026-08-07/x.zip"
        );
        assert_eq!(
            object_key(Some("/parcel-extracts/"), date(), "x.zip"),
            "parcel-extracts/2026-08-07/x.zip"
        );
    }

    #[test]
    fn test_sha256_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"Hello, World!").unwrap();
        let checksum = sha256_file(tmp.path()).unwrap();
        assert_eq!(
            checksum,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn test_retried_job_reproduces_identical_key() {
        let basename = destination_basename("recorder", &code("TX"), date(), "zip");
        let first = object_key(Some("extracts"), date(), &basename);
        let second = object_key(Some("extracts"), date(), &basename);
        assert_eq!(first, second);
    }
}
