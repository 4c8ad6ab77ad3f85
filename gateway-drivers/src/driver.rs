//! The `Driver` trait and its ephemeral request/response types, shared by
//! every per-provider implementation in this crate.

use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value};

use gateway_core::job::Operation;

use crate::error::DriverResult;

/// Everything a driver needs to submit one provider call. Not every field
/// is used by every operation: `bytes` is absent for text-only generation,
/// `mask_bytes` only matters for inpaint-style operations, `image_urls`
/// carries zero or more already-ingested BlobStore URLs for operations that
/// pass references rather than raw bytes.
#[derive(Debug, Clone, Default)]
pub struct DriverInputs {
    pub bytes: Option<Vec<u8>>,
    pub mask_bytes: Option<Vec<u8>>,
    pub filename: Option<String>,
    pub image_urls: Vec<String>,
    /// Set by the caller when a 3D-model request is a multiview submission
    /// (Tripo's `multiview_to_model`) rather than a single-image one, since
    /// image count alone doesn't disambiguate a front-view-only multiview
    /// request from a plain single-image request.
    pub multiview: bool,
    pub params: JsonMap<String, Value>,
}

impl DriverInputs {
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Renders a parameter as a bare string suitable for a multipart form
    /// field, unwrapping JSON string quoting for non-string values.
    pub fn param_form_value(&self, key: &str) -> Option<String> {
        self.params.get(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// A secondary artifact from a provider response that returned more than
/// one image (OpenAI's `n`-image edit, Recraft's multi-url response).
/// Never set for operations a provider can only return one artifact for.
#[derive(Debug, Clone)]
pub struct ExtraArtifact {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub enum DriverOutcome {
    Synchronous {
        bytes: Vec<u8>,
        content_type: String,
        extra: Vec<ExtraArtifact>,
    },
    RemoteTask {
        provider_task_id: String,
        poll_url: Option<String>,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub enum ArtifactRef {
    Url(String),
    Bytes(Vec<u8>, Option<String>),
}

#[derive(Debug, Clone)]
pub enum PollResult {
    InProgress { progress_percent: u8 },
    Ready { artifact_ref: ArtifactRef },
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy)]
pub struct DriverCapabilities {
    pub needs_input_bytes: bool,
    pub is_synchronous: bool,
    pub artifact_content_type_hint: Option<&'static str>,
}

/// A per-provider adapter implementing submit/poll/capabilities. Drivers
/// never retry on their own: a 4xx response is fatal to the job, a 5xx or
/// transport failure is folded into `UpstreamUnavailable` for the caller
/// to decide whether to retry the job as a whole.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn submit(&self, operation: Operation, inputs: DriverInputs) -> DriverResult<DriverOutcome>;

    async fn poll(
        &self,
        operation: Operation,
        provider_task_id: &str,
        poll_url: Option<&str>,
    ) -> DriverResult<PollResult>;

    fn capabilities(&self, operation: Operation) -> DriverCapabilities;
}
