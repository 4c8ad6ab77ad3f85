//! # gateway-queue: multi-tenant job processing for the generative-media gateway
//!
//! Lease-based dequeue with an expiry reaper, cancel-wins semantics, and
//! tenant-scoped idempotency on top of a pluggable [`QueueBackend`]. Jobs are
//! dispatched onto three fixed named queues (`default`, `tripo_other`,
//! `tripo_refine`); each queue enforces its own concurrency, and each
//! `(queue, provider)` pair is additionally token-bucket rate limited before
//! a leased job reaches its driver.
//!
//! ```rust
//! use gateway_queue::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct GenerateImageJob {
//!     job_id: String,
//! }
//!
//! #[async_trait::async_trait]
//! impl Job for GenerateImageJob {
//!     type Context = ();
//!     type Result = ();
//!
//!     const JOB_TYPE: &'static str = "generate_image";
//!     const PRIORITY: JobPriority = JobPriority::Normal;
//!     const MAX_RETRIES: u32 = 3;
//!
//!     async fn execute(&self, _ctx: Self::Context) -> Result<Self::Result, JobError> {
//!         Ok(())
//!     }
//! }
//! ```

pub mod types;
pub mod error;
pub mod codec;
pub mod job;
pub mod backend;
pub mod adapter;
pub mod observability;
pub mod rate_limit;

pub use adapter::QueueAdapter;
pub use types::{
    JobId, QueueCtx, JobPriority, JobStatus, JobMessage, JobRecord,
    LeasedJob, QueueCapabilities, JobEvent, LeaseToken,
};
pub use error::{QueueError, QueueResult, JobError};
pub use codec::{JobCodec, CodecRegistry};
pub use codec::json::JsonCodec;
pub use job::{Job, JobRegistry};
pub use backend::QueueBackend;
pub use adapter::{WorkerHandle, QueueConfig};
pub use observability::{ObservabilityLayer, LiveMetrics};
pub use rate_limit::RateLimiter;

/// Convenience re-exports for implementing and registering job types.
pub mod prelude {
    pub use crate::{QueueAdapter, Job, QueueBackend};
    pub use crate::{QueueCtx, JobId, JobPriority, JobStatus, JobError, QueueResult};
    pub use crate::{JobCodec, JsonCodec, CodecRegistry};
    pub use crate::JobRegistry;
    pub use crate::{ObservabilityLayer, LiveMetrics};
    pub use async_trait::async_trait;
}
