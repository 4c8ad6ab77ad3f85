//! The shapes C6 trades in: an inbound submission, the handle returned to
//! the caller, and the status view `GetJobStatus` produces. None of these
//! cross the wire directly — the HTTP adapter owns its own JSON types and
//! maps onto these.

use std::collections::BTreeMap;

use serde_json::Value;

use gateway_core::error::{GatewayError, GatewayResult};
use gateway_core::job::{JobStatus, Operation, Provider};
use gateway_core::tenant::TenantContext;

/// A validated-at-the-edge request to run one provider operation. The HTTP
/// adapter is responsible for deserializing its own per-endpoint JSON body
/// into this shape before calling [`crate::orchestrator::Orchestrator::submit_job`].
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub client_task_id: String,
    pub tenant: TenantContext,
    pub provider: Provider,
    pub operation: Operation,
    pub prompt: Option<String>,
    pub style: Option<String>,
    /// A BlobStore or foreign URL to fetch as the operation's primary input.
    /// Absent for text-only generation.
    pub source_asset_url: Option<String>,
    /// Already-ingested BlobStore URLs for operations that pass references
    /// rather than bytes (Tripo's image-to-model family). For a multiview
    /// submission, position 0 is the front view.
    pub image_urls: Vec<String>,
    pub multiview: bool,
    pub is_public: bool,
    /// Operation-specific parameters: `prompt`/`style_preset`/`size`/`n`/
    /// `background` for image ops, `max_size_mb`/`aspect_ratio_mode`/
    /// `output_format` for downscale, `draft_model_task_id` for refine.
    pub params: BTreeMap<String, Value>,
}

/// Returned by `SubmitJob`; the only identifier the client needs to poll
/// status with.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub worker_task_id: String,
}

/// The `service` hint a status query is made with — names how to interpret
/// a still-in-flight job's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderClass {
    OpenAi,
    TripoAi,
}

impl ProviderClass {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(ProviderClass::OpenAi),
            "tripoai" => Some(ProviderClass::TripoAi),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusView {
    pub worker_task_id: String,
    pub status: JobStatus,
    pub asset_url: Option<String>,
    pub error: Option<String>,
    pub progress: Option<u8>,
}

/// The fixed routing table's driver side: which `(provider, operation)`
/// pairs this repo has a driver for. `queue_for` in `gateway-core` is total
/// (every pair lands on *some* queue), so this is the actual "reject
/// unknowns" check `SubmitJob` step 1 calls for.
pub fn provider_supports_operation(provider: Provider, operation: Operation) -> bool {
    if operation == Operation::Downscale {
        // Backed by `ExecutionContext::local_image_driver`, not a provider.
        return true;
    }

    use Operation::*;
    match provider {
        Provider::OpenAi => matches!(operation, ImageToImage),
        Provider::Stability => {
            matches!(operation, TextToImage | ImageToImage | SketchToImage | RemoveBackground | SearchAndRecolor | Upscale | ImageToModel)
        }
        Provider::Recraft => matches!(operation, ImageToImage | TextToImage | RemoveBackground | Inpaint | Upscale),
        Provider::Flux => matches!(operation, ImageToImage | TextToImage),
        Provider::Tripo => matches!(operation, TextToModel | ImageToModel | RefineModel),
    }
}

fn param_f64(params: &BTreeMap<String, Value>, key: &str) -> Option<f64> {
    params.get(key).and_then(|v| v.as_f64())
}

fn param_u64(params: &BTreeMap<String, Value>, key: &str) -> Option<u64> {
    params.get(key).and_then(|v| v.as_u64())
}

/// Operation-specific boundary checks `SubmitJob` step 2 applies once the
/// `(provider, operation)` pair itself is known-good.
pub fn validate_operation_constraints(request: &SubmitRequest) -> GatewayResult<()> {
    if request.operation == Operation::ImageToImage && request.provider == Provider::OpenAi {
        let n = param_u64(&request.params, "n").unwrap_or(1);
        if !(1..=10).contains(&n) {
            return Err(GatewayError::InvalidRequest(format!("n must be between 1 and 10, got {n}")));
        }
    }

    if request.operation == Operation::Downscale {
        let max_size_mb = param_f64(&request.params, "max_size_mb")
            .ok_or_else(|| GatewayError::InvalidRequest("downscale requires max_size_mb".to_string()))?;
        if !(max_size_mb > 0.0 && max_size_mb <= 20.0) {
            return Err(GatewayError::InvalidRequest(format!(
                "max_size_mb must be in (0, 20], got {max_size_mb}"
            )));
        }
    }

    if request.operation == Operation::ImageToModel && request.multiview && request.image_urls.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "multiview_to_model requires at least a front view image".to_string(),
        ));
    }

    Ok(())
}
