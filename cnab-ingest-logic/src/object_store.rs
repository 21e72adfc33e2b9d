//! Object store gateway (C3) — put/get/delete of opaque blobs.
//!
//! Mirrors the teacher's `S3Storage`: a thin wrapper around an S3-compatible
//! client, with a non-blocking bucket-ensure at construction time so a
//! store outage never prevents the process from coming up.

use anyhow::Context;
use aws_credential_types::Credentials;
use aws_sdk_s3::{config::Region, primitives::ByteStream, Client};
use serde::Deserialize;

use crate::error::IngestError;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ObjectStoreSettings {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub create_bucket: bool,
    pub validate_on_initialization: bool,
}

impl Default for ObjectStoreSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000".to_string(),
            region: "us-east-1".to_string(),
            bucket: "cnab-uploads".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            create_bucket: false,
            validate_on_initialization: false,
        }
    }
}

#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
    bucket: String,
}

impl ObjectStore {
    /// Construction never fails on a store outage: bucket creation is
    /// attempted but its failure is only logged, per §4.3's requirement
    /// that startup initialisation be non-blocking.
    pub async fn new(settings: ObjectStoreSettings) -> anyhow::Result<Self> {
        let credentials = Credentials::new(
            settings.access_key_id,
            settings.secret_access_key,
            None,
            None,
            "cnab-ingest-static",
        );
        let config = aws_sdk_s3::config::Builder::new()
            .endpoint_url(settings.endpoint)
            .region(Region::new(settings.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .behavior_version_latest()
            .build();
        let client = Client::from_conf(config);

        if settings.create_bucket {
            if let Err(err) = client.create_bucket().bucket(&settings.bucket).send().await {
                tracing::warn!(error = ?err, bucket = settings.bucket, "failed to ensure bucket exists, continuing startup");
            }
        }

        if settings.validate_on_initialization {
            if let Err(err) = client.head_bucket().bucket(&settings.bucket).send().await {
                tracing::warn!(error = ?err, bucket = settings.bucket, "bucket validation failed at startup, continuing anyway");
            }
        }

        Ok(Self {
            client,
            bucket: settings.bucket,
        })
    }

    /// Fatal on failure — used at intake time, where a store outage must
    /// fail the upload (§4.3).
    pub async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), IngestError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map(|_| ())
            .context("put object into object store")
            .map_err(IngestError::StorageFailure)
    }

    pub async fn get(&self, path: &str) -> Result<Vec<u8>, IngestError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .context("get object from object store")
            .map_err(IngestError::StorageFailure)?;

        let bytes = object
            .body
            .collect()
            .await
            .context("read object body")
            .map_err(IngestError::StorageFailure)?
            .into_bytes();

        Ok(bytes.to_vec())
    }

    pub async fn delete(&self, path: &str) -> Result<(), IngestError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map(|_| ())
            .context("delete object from object store")
            .map_err(IngestError::StorageFailure)
    }
}
