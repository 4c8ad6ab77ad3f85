//! gateway-blob: the Artifact Pipeline (C2) and its BlobStore abstraction.
//!
//! ```text
//! ┌──────────────────────┐
//! │  Job Orchestrator     │  ← calls ingest_inline_bytes / ingest_from_url
//! ├──────────────────────┤
//! │  ArtifactPipeline     │  ← canonical path scheme, public vs signed URL
//! ├──────────────────────┤
//! │  BlobStore            │  ← storage primitives (S3-compatible or memory)
//! └──────────────────────┘
//! ```

pub mod error;
pub mod memory_store;
pub mod pipeline;
pub mod s3_store;
pub mod store;

pub use error::{BlobError, BlobResult};
pub use memory_store::InMemoryBlobStore;
pub use pipeline::ArtifactPipeline;
pub use s3_store::S3BlobStore;
pub use store::{
    BlobKeyStrategy, BlobStore, GatewayKeyStrategy, GetResult, PutResult, SignedUrlBlobStore, StoreCapabilities,
};
