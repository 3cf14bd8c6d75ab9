//! Object-store capability used by the synchronizer.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tracing::debug;

use super::types::ObjectRecord;
use crate::config::SyncSpec;

/// What the synchronizer needs from a bucket: list a prefix and stream an
/// object's bytes.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Label for log lines, e.g. `s3://bucket`.
    fn describe(&self) -> String;

    /// All objects whose key lives under `prefix` (a `/`-terminated
    /// namespace, or empty for the whole bucket).
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectRecord>>;

    /// Stream the content of `key`.
    async fn fetch(&self, key: &str) -> Result<BoxStream<'static, Result<Bytes>>>;
}

/// [`ArtifactStore`] backed by any `object_store` implementation.
pub struct ObjectStoreArtifacts {
    store: Arc<dyn ObjectStore>,
    label: String,
}

impl ObjectStoreArtifacts {
    pub fn new(store: Arc<dyn ObjectStore>, label: impl Into<String>) -> Self {
        Self {
            store,
            label: label.into(),
        }
    }

    /// Build an S3 client for the bucket in `spec`.
    pub fn s3(spec: &SyncSpec) -> Result<Self> {
        let mut builder = AmazonS3Builder::new().with_bucket_name(&spec.bucket);

        if let Some(ref region) = spec.region {
            builder = builder.with_region(region);
        }

        if let Some(ref credentials) = spec.credentials {
            builder = builder
                .with_access_key_id(&credentials.access_key_id)
                .with_secret_access_key(&credentials.secret_access_key);
        }

        if let Some(ref endpoint) = spec.endpoint {
            // S3-compatible providers expect path-style addressing.
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false);

            if endpoint.starts_with("http://") {
                builder = builder.with_allow_http(true);
            }
        }

        let store = builder
            .build()
            .with_context(|| format!("Failed to build S3 client for bucket {}", spec.bucket))?;

        Ok(Self::new(Arc::new(store), format!("s3://{}", spec.bucket)))
    }
}

#[async_trait]
impl ArtifactStore for ObjectStoreArtifacts {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectRecord>> {
        let trimmed = prefix.trim_end_matches('/');
        let object_prefix = (!trimmed.is_empty()).then(|| ObjectPath::from(trimmed));

        let mut listing = self.store.list(object_prefix.as_ref());
        let mut records = Vec::new();

        while let Some(meta) = listing.next().await {
            let meta = meta.with_context(|| {
                format!("Failed to list {}/{}", self.label, prefix)
            })?;

            records.push(ObjectRecord {
                key: meta.location.to_string(),
                size: meta.size as u64,
                last_modified: Some(meta.last_modified),
                e_tag: meta.e_tag,
            });
        }

        debug!(
            "Listed {} object(s) under {}/{}",
            records.len(),
            self.label,
            prefix
        );
        Ok(records)
    }

    async fn fetch(&self, key: &str) -> Result<BoxStream<'static, Result<Bytes>>> {
        let location =
            ObjectPath::parse(key).with_context(|| format!("Invalid object key: {}", key))?;

        let result = self
            .store
            .get(&location)
            .await
            .with_context(|| format!("Failed to get {}/{}", self.label, key))?;

        Ok(result
            .into_stream()
            .map(|chunk| chunk.map_err(anyhow::Error::from))
            .boxed())
    }
}
