//! In-memory `BlobStore` used by the Artifact Pipeline's own tests and by
//! anything downstream that wants to exercise ingestion without a network
//! bucket, in the same spirit as the Worker Runtime's in-memory queue
//! backend standing in for a network broker.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::BlobError;
use crate::store::{BlobStore, ByteStream, GetResult, PutResult, SignedUrlBlobStore, StoreCapabilities};

struct Entry {
    bytes: Vec<u8>,
    content_type: Option<String>,
}

#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: RwLock<HashMap<String, Entry>>,
    is_public: bool,
}

impl InMemoryBlobStore {
    pub fn new(is_public: bool) -> Arc<Self> {
        Arc::new(Self {
            objects: RwLock::new(HashMap::new()),
            is_public,
        })
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, content_type: Option<&str>, stream: ByteStream) -> crate::error::BlobResult<PutResult> {
        let size_bytes = stream.len() as u64;
        self.objects.write().insert(
            key.to_string(),
            Entry {
                bytes: stream,
                content_type: content_type.map(|s| s.to_string()),
            },
        );
        Ok(PutResult { etag: None, size_bytes })
    }

    async fn get(&self, key: &str) -> crate::error::BlobResult<GetResult> {
        let guard = self.objects.read();
        let entry = guard.get(key).ok_or_else(|| BlobError::NotFound(key.to_string()))?;
        Ok(GetResult {
            bytes: entry.bytes.clone(),
            content_type: entry.content_type.clone(),
        })
    }

    async fn delete(&self, key: &str) -> crate::error::BlobResult<()> {
        self.objects.write().remove(key);
        Ok(())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            is_public: self.is_public,
            supports_signed_urls: true,
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://{key}")
    }
}

#[async_trait]
impl SignedUrlBlobStore for InMemoryBlobStore {
    async fn sign_get(&self, key: &str, expires_in_secs: u64) -> crate::error::BlobResult<String> {
        Ok(format!("memory://{key}?expires_in={expires_in_secs}"))
    }
}
