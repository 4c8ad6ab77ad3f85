//! One handler per `(kind, operation)` pair, plus the status endpoint.
//! Request bodies share a single shape; the operation itself is fixed per
//! route rather than read from the body.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use gateway_core::job::{JobStatus, Operation, Provider};
use gateway_core::tenant::TenantContext;
use gateway_orchestrator::{ProviderClass, SubmitRequest};

use crate::error::GatewayHttpError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub task_id: String,
    pub provider: Provider,
    pub prompt: Option<String>,
    pub style: Option<String>,
    pub source_asset_url: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub multiview: bool,
    #[serde(default)]
    pub is_public: bool,
    #[serde(flatten)]
    pub params: BTreeMap<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct TaskHandleResponse {
    pub task_id: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub worker_task_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub service: Option<String>,
}

async fn submit(
    state: AppState,
    tenant: TenantContext,
    operation: Operation,
    body: SubmitBody,
) -> Result<Json<TaskHandleResponse>, GatewayHttpError> {
    let request = SubmitRequest {
        client_task_id: body.task_id,
        tenant,
        provider: body.provider,
        operation,
        prompt: body.prompt,
        style: body.style,
        source_asset_url: body.source_asset_url,
        image_urls: body.image_urls,
        multiview: body.multiview,
        is_public: body.is_public,
        params: body.params,
    };
    let handle = state.orchestrator.submit_job(request).await?;
    Ok(Json(TaskHandleResponse { task_id: handle.worker_task_id }))
}

macro_rules! submit_handler {
    ($name:ident, $operation:expr) => {
        async fn $name(
            State(state): State<AppState>,
            Extension(tenant): Extension<TenantContext>,
            Json(body): Json<SubmitBody>,
        ) -> Result<Json<TaskHandleResponse>, GatewayHttpError> {
            submit(state, tenant, $operation, body).await
        }
    };
}

submit_handler!(text_to_image, Operation::TextToImage);
submit_handler!(image_to_image, Operation::ImageToImage);
submit_handler!(sketch_to_image, Operation::SketchToImage);
submit_handler!(remove_background, Operation::RemoveBackground);
submit_handler!(inpaint, Operation::Inpaint);
submit_handler!(search_and_recolor, Operation::SearchAndRecolor);
submit_handler!(upscale, Operation::Upscale);
submit_handler!(downscale, Operation::Downscale);
submit_handler!(text_to_model, Operation::TextToModel);
submit_handler!(image_to_model, Operation::ImageToModel);
submit_handler!(refine_model, Operation::RefineModel);

async fn get_status(
    State(state): State<AppState>,
    Path(worker_task_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, GatewayHttpError> {
    let provider_class = query.service.as_deref().and_then(ProviderClass::parse);
    let status = state.orchestrator.get_job_status(&worker_task_id, provider_class).await?;
    Ok(Json(StatusResponse {
        worker_task_id: status.worker_task_id,
        status: status.status,
        asset_url: status.asset_url,
        error: status.error,
        progress: status.progress,
    }))
}

/// Routes gated by `auth::require_api_key`: one per image/model operation.
pub fn submit_router() -> Router<AppState> {
    Router::new()
        .route("/images/text_to_image", post(text_to_image))
        .route("/images/image_to_image", post(image_to_image))
        .route("/images/sketch_to_image", post(sketch_to_image))
        .route("/images/remove_background", post(remove_background))
        .route("/images/inpaint", post(inpaint))
        .route("/images/search_and_recolor", post(search_and_recolor))
        .route("/images/upscale", post(upscale))
        .route("/images/downscale", post(downscale))
        .route("/models/text_to_model", post(text_to_model))
        .route("/models/image_to_model", post(image_to_model))
        .route("/models/refine_model", post(refine_model))
}

/// The status route, gated only by `auth::resolve_tenant_optional`.
pub fn status_router() -> Router<AppState> {
    Router::new().route("/tasks/{worker_task_id}/status", get(get_status))
}
