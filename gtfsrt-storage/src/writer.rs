//! Blob writer for fetched snapshots

use std::collections::HashMap;
use std::sync::Arc;

use chrono::SecondsFormat;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::keys::{object_key, sidecar_key};
use gtfsrt_config::FeedSpec;
use gtfsrt_http::FetchOutcome;
use gtfsrt_resilience::Retryable;

/// Response headers worth keeping in the sidecar.
const KEPT_HEADERS: [&str; 4] = ["etag", "last-modified", "content-type", "content-length"];

/// Blob write errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob store error: {0}")]
    Store(#[from] object_store::Error),

    #[error("failed to serialize sidecar metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl Retryable for StorageError {
    fn is_retryable(&self) -> bool {
        // Uploads are idempotent (same key, same bytes), so transient store
        // failures are always worth replaying; metadata serialization is not.
        matches!(self, StorageError::Store(_))
    }
}

/// JSON sidecar written next to each payload object.
#[derive(Debug, Serialize)]
pub struct SidecarMetadata<'a> {
    pub feed_id: &'a str,
    pub agency_id: &'a str,
    pub agency_name: &'a str,
    pub system_id: Option<&'a str>,
    pub system_name: Option<&'a str>,
    pub url: &'a str,
    pub fetch_timestamp: String,
    pub duration_ms: f64,
    pub response_code: u16,
    pub content_length: usize,
    pub content_type: Option<&'a str>,
    pub headers: HashMap<String, String>,
}

impl<'a> SidecarMetadata<'a> {
    pub fn new(spec: &'a FeedSpec, outcome: &'a FetchOutcome) -> Self {
        let headers = outcome
            .headers
            .iter()
            .filter(|(k, _)| KEPT_HEADERS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            feed_id: &spec.id,
            agency_id: &spec.agency_id,
            agency_name: &spec.agency_name,
            system_id: spec.system_id.as_deref(),
            system_name: spec.system_name.as_deref(),
            url: spec.url.as_str(),
            fetch_timestamp: outcome
                .fetch_start_time
                .to_rfc3339_opts(SecondsFormat::Micros, false),
            duration_ms: outcome.duration_ms,
            response_code: outcome.status_code,
            content_length: outcome.content_length,
            content_type: outcome.content_type(),
            headers,
        }
    }
}

/// Writes fetch outcomes into the archive bucket.
///
/// The underlying store handle is created lazily on first write and shared by
/// every concurrent pipeline. The write itself is a single idempotent
/// operation; callers wrap it in their own bounded retry.
pub struct BlobWriter {
    bucket: String,
    write_metadata: bool,
    store: OnceCell<Arc<dyn ObjectStore>>,
}

impl BlobWriter {
    /// Writer backed by a GCS bucket (handle built on first use).
    pub fn new(bucket: impl Into<String>, write_metadata: bool) -> Self {
        Self {
            bucket: bucket.into(),
            write_metadata,
            store: OnceCell::new(),
        }
    }

    /// Writer over an existing store handle (used by tests and tools).
    pub fn with_store(store: Arc<dyn ObjectStore>, write_metadata: bool) -> Self {
        let cell = OnceCell::new();
        // A fresh cell accepts exactly one value
        let _ = cell.set(store);
        Self {
            bucket: String::new(),
            write_metadata,
            store: cell,
        }
    }

    async fn store(&self) -> Result<&Arc<dyn ObjectStore>, StorageError> {
        self.store
            .get_or_try_init(|| async {
                let store = GoogleCloudStorageBuilder::new()
                    .with_bucket_name(&self.bucket)
                    .build()?;
                Ok::<Arc<dyn ObjectStore>, StorageError>(Arc::new(store))
            })
            .await
    }

    /// Upload the payload and its `.meta` sidecar; returns the payload key.
    pub async fn write(
        &self,
        spec: &FeedSpec,
        outcome: &FetchOutcome,
    ) -> Result<String, StorageError> {
        let store = self.store().await?;
        let key = object_key(spec.feed_type, spec.url.as_str(), outcome.fetch_start_time);

        let payload_opts = PutOptions::from(Attributes::from_iter([(
            Attribute::ContentType,
            "application/x-protobuf",
        )]));
        store
            .put_opts(
                &Path::from(key.as_str()),
                outcome.content.clone().into(),
                payload_opts,
            )
            .await?;

        if self.write_metadata {
            let metadata = SidecarMetadata::new(spec, outcome);
            let body = serde_json::to_vec_pretty(&metadata)?;
            let meta_opts = PutOptions::from(Attributes::from_iter([(
                Attribute::ContentType,
                "application/json",
            )]));
            store
                .put_opts(&Path::from(sidecar_key(&key)), body.into(), meta_opts)
                .await?;
        }

        debug!(feed_id = %spec.id, key = %key, bytes = outcome.content_length, "snapshot archived");
        Ok(key)
    }
}
