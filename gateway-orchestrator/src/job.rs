//! The queue-level envelope for a provider call. `ExecuteProviderJob` carries
//! everything the lifecycle runner needs to take one job from submission to
//! a terminal status; the heavy lifting lives in [`crate::lifecycle`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use gateway_core::job::{Operation, Provider};
use gateway_core::routing::queue_for;
use gateway_queue::{Job, JobError, JobPriority};

use crate::context::ExecutionContext;
use crate::lifecycle::run_lifecycle;

/// The request parameters collected at submission time, opaque to the queue
/// itself and interpreted by the lifecycle runner and the driver it picks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteProviderJob {
    pub job_id: Uuid,
    pub provider: Provider,
    pub operation: Operation,
    pub params: BTreeMap<String, Value>,
    /// Base64-encoded input image bytes, staged by C6 before enqueue.
    pub input_bytes_b64: Option<String>,
    pub mask_bytes_b64: Option<String>,
    pub input_filename: Option<String>,
    /// Already-ingested BlobStore URLs, for drivers that pass references
    /// rather than raw bytes (Tripo's image-to-model family).
    pub image_urls: Vec<String>,
    pub multiview: bool,
}

#[async_trait]
impl Job for ExecuteProviderJob {
    type Context = ExecutionContext;
    type Result = ();

    const JOB_TYPE: &'static str = "execute_provider_job";
    const PRIORITY: JobPriority = JobPriority::Normal;
    const MAX_RETRIES: u32 = 0;

    async fn execute(&self, ctx: Self::Context) -> Result<(), JobError> {
        run_lifecycle(self, &ctx)
            .await
            .map_err(|e| JobError::permanent(e.to_string()))
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(self.job_id.to_string())
    }

    fn queue_name(&self) -> String {
        queue_for(self.provider, self.operation).as_str().to_string()
    }

    /// Downscale has no AI provider behind it (see
    /// [`crate::context::ExecutionContext::local_image_driver`]); leaving
    /// this unbound keeps its jobs off a provider rate-limit bucket they
    /// have no business consuming.
    fn provider_name(&self) -> String {
        if self.operation == Operation::Downscale {
            String::new()
        } else {
            self.provider.as_str().to_string()
        }
    }
}
