//! The Artifact Pipeline (C2): downloads bytes from provider-returned URLs
//! or decodes inline payloads, uploads to the configured BlobStore under the
//! canonical path, and returns the persisted URL.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::instrument;

use crate::error::{BlobError, BlobResult};
use crate::store::{require_nonempty, BlobKeyStrategy, GatewayKeyStrategy, SignedUrlBlobStore};

/// Signed URLs handed back to callers are valid for one hour.
const SIGNED_URL_TTL_SECONDS: u64 = 3600;

pub struct ArtifactPipeline {
    store: Arc<dyn SignedUrlBlobStore>,
    keys: Arc<dyn BlobKeyStrategy>,
    http: Client,
    test_mode: bool,
}

impl ArtifactPipeline {
    pub fn new(store: Arc<dyn SignedUrlBlobStore>, test_mode: bool) -> Self {
        Self {
            store,
            keys: Arc::new(GatewayKeyStrategy),
            http: Client::new(),
            test_mode,
        }
    }

    fn root(&self) -> &'static str {
        if self.test_mode {
            "test_outputs/"
        } else {
            ""
        }
    }

    async fn finish_upload(&self, key: &str, bytes: Vec<u8>, content_type: Option<&str>) -> BlobResult<String> {
        require_nonempty(&bytes)?;
        self.store
            .put(key, content_type, bytes)
            .await
            .map_err(|e| BlobError::ArtifactStoreError(e.to_string()))?;

        let caps = self.store.capabilities();
        if caps.is_public {
            Ok(self.store.public_url(key))
        } else {
            self.store.sign_get(key, SIGNED_URL_TTL_SECONDS).await
        }
    }

    /// `IngestInlineBytes(job, bytes, content_type, logical_name) -> blob_url`.
    #[instrument(skip(self, bytes))]
    pub async fn ingest_inline_bytes(
        &self,
        asset_type_plural: &str,
        client_task_id: &str,
        bytes: Vec<u8>,
        content_type: &str,
        logical_name: &str,
    ) -> BlobResult<String> {
        let key = self
            .keys
            .object_key(self.root(), asset_type_plural, client_task_id, logical_name);
        self.finish_upload(&key, bytes, Some(content_type)).await
    }

    /// `IngestFromUrl(job, source_url, logical_name) -> blob_url`. `source_url`
    /// may be a public or signed BlobStore URL or a foreign provider URL; all
    /// three are fetched the same way, with `timeout` bounding the fetch.
    #[instrument(skip(self))]
    pub async fn ingest_from_url(
        &self,
        asset_type_plural: &str,
        client_task_id: &str,
        source_url: &str,
        logical_name: &str,
        timeout: Duration,
    ) -> BlobResult<String> {
        let response = self
            .http
            .get(source_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| BlobError::ArtifactFetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BlobError::ArtifactFetchError(format!(
                "fetch of {source_url} returned {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BlobError::ArtifactFetchError(e.to_string()))?
            .to_vec();

        let key = self
            .keys
            .object_key(self.root(), asset_type_plural, client_task_id, logical_name);
        self.finish_upload(&key, bytes, content_type.as_deref()).await
    }

    /// Stages client-supplied input bytes under `test_inputs/{op_name}` when
    /// the pipeline is running in test mode; a no-op helper for production,
    /// where staged copies of inputs are not kept.
    pub async fn stage_test_input(
        &self,
        op_name: &str,
        client_task_id: &str,
        bytes: Vec<u8>,
        content_type: &str,
        logical_name: &str,
    ) -> BlobResult<Option<String>> {
        if !self.test_mode {
            return Ok(None);
        }
        let key = self.keys.staging_key(op_name, client_task_id, logical_name);
        let url = self.finish_upload(&key, bytes, Some(content_type)).await?;
        Ok(Some(url))
    }
}
