use thiserror::Error;

use gateway_core::GatewayError;

pub type BlobResult<T> = Result<T, BlobError>;

/// Errors produced by the BlobStore abstraction and the Artifact Pipeline.
/// Maps onto the `ArtifactFetchError` / `ArtifactStoreError` leaves of the
/// gateway's canonical error taxonomy.
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("artifact fetch error: {0}")]
    ArtifactFetchError(String),

    #[error("artifact store error: {0}")]
    ArtifactStoreError(String),

    #[error("operation not supported by this store")]
    Unsupported,

    #[error("storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BlobError {
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend { source: Box::new(error) }
    }
}

impl From<BlobError> for GatewayError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::ArtifactFetchError(msg) => GatewayError::ArtifactFetchError(msg),
            BlobError::NotFound(msg) => GatewayError::ArtifactFetchError(msg),
            other => GatewayError::ArtifactStoreError(other.to_string()),
        }
    }
}
