use async_trait::async_trait;

use crate::error::{BlobError, BlobResult};

/// Byte stream returned by a `get`. Artifacts here are single images or 3D
/// models, not multi-gigabyte media, so both backends in this crate buffer
/// fully in memory rather than exposing a chunked stream type.
pub type ByteStream = Vec<u8>;

/// Core blob storage operations. Both the S3-backed production store and the
/// in-memory test store implement this; the Artifact Pipeline (C2) only ever
/// talks to this trait.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, content_type: Option<&str>, stream: ByteStream) -> BlobResult<PutResult>;

    async fn get(&self, key: &str) -> BlobResult<GetResult>;

    async fn delete(&self, key: &str) -> BlobResult<()>;

    fn capabilities(&self) -> StoreCapabilities;

    /// The externally-resolvable URL for `key` when the bucket is public.
    /// Backends that are never public still implement this; callers
    /// only use it when `capabilities().is_public`.
    fn public_url(&self, key: &str) -> String;
}

/// Optional signed-URL support: a valid-for-one-hour URL handed back when
/// the backing bucket isn't public.
#[async_trait]
pub trait SignedUrlBlobStore: BlobStore {
    async fn sign_get(&self, key: &str, expires_in_secs: u64) -> BlobResult<String>;
}

#[derive(Debug, Clone)]
pub struct PutResult {
    pub etag: Option<String>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct GetResult {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StoreCapabilities {
    pub is_public: bool,
    pub supports_signed_urls: bool,
}

/// Strategy for turning a job's identity into a storage key. The trait
/// exists so tests can swap in a deterministic variant; [`GatewayKeyStrategy`]
/// is the one canonical scheme this gateway uses in production.
pub trait BlobKeyStrategy: Send + Sync {
    /// `{root}/{asset_type_plural}/{client_task_id}/{file_name}`.
    fn object_key(&self, root: &str, asset_type_plural: &str, client_task_id: &str, file_name: &str) -> String;

    /// `test_inputs/{op_name}/{client_task_id}/{file_name}`.
    fn staging_key(&self, op_name: &str, client_task_id: &str, file_name: &str) -> String;
}

#[derive(Debug, Clone, Default)]
pub struct GatewayKeyStrategy;

impl BlobKeyStrategy for GatewayKeyStrategy {
    fn object_key(&self, root: &str, asset_type_plural: &str, client_task_id: &str, file_name: &str) -> String {
        if root.is_empty() {
            format!("{asset_type_plural}/{client_task_id}/{file_name}")
        } else {
            format!("{root}{asset_type_plural}/{client_task_id}/{file_name}")
        }
    }

    fn staging_key(&self, op_name: &str, client_task_id: &str, file_name: &str) -> String {
        format!("test_inputs/{op_name}/{client_task_id}/{file_name}")
    }
}

pub(crate) fn require_nonempty(bytes: &[u8]) -> BlobResult<()> {
    if bytes.is_empty() {
        return Err(BlobError::ArtifactFetchError("zero-byte content".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_matches_canonical_scheme_in_production() {
        let strategy = GatewayKeyStrategy;
        let key = strategy.object_key("", "images", "t1", "0.png");
        assert_eq!(key, "images/t1/0.png");
    }

    #[test]
    fn object_key_prefixes_root_in_test_mode() {
        let strategy = GatewayKeyStrategy;
        let key = strategy.object_key("test_outputs/", "models", "t1", "model.glb");
        assert_eq!(key, "test_outputs/models/t1/model.glb");
    }

    #[test]
    fn staging_key_matches_test_input_scheme() {
        let strategy = GatewayKeyStrategy;
        let key = strategy.staging_key("image_to_image", "t1", "portrait.jpg");
        assert_eq!(key, "test_inputs/image_to_image/t1/portrait.jpg");
    }
}
