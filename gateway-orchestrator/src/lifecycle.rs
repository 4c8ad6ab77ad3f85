//! The per-job state machine run by a worker: submit, optionally poll,
//! ingest, finalize. One call to [`run_lifecycle`] takes exactly one job
//! from `processing` to a terminal status. Every failure path here ends in
//! a `failed` Job row, never a propagated error: a worker redelivery should
//! never see a half-finished job, and the queue's own retry budget for this
//! job type is zero anyway (see [`crate::job::ExecuteProviderJob`]).

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use gateway_core::config::TimeoutClass;
use gateway_core::error::{GatewayError, GatewayResult};
use gateway_core::job::{JobKind, JobStatus, Operation, Provider};
use gateway_core::store::JobPatch;
use gateway_core::GatewaySettings;
use gateway_drivers::{ArtifactRef, Driver, DriverInputs, DriverOutcome, ExtraArtifact, PollResult};

use crate::context::{DriverRegistry, ExecutionContext};
use crate::job::ExecuteProviderJob;

/// A driver result normalized to something the Ingest step can persist,
/// after the Submit/Poll split collapses back into one value.
enum ReadyArtifact {
    Bytes(Vec<u8>, String),
    Url(String),
}

/// What the poll loop settled on: ready to ingest, a terminal provider
/// failure, or deadline exceeded. Never propagated as an `Err` — every
/// variant maps to a concrete Job state the caller applies directly.
enum PollOutcome {
    Ready(ReadyArtifact),
    Failed(String),
    Timeout,
}

fn poll_interval_for(provider: Provider, settings: &GatewaySettings) -> Duration {
    match provider {
        Provider::Flux => settings.flux_poll_interval(),
        Provider::Tripo => settings.tripo_poll_interval(),
        _ => settings.tripo_poll_interval(),
    }
}

fn timeout_class_for(operation: Operation, multiview: bool) -> TimeoutClass {
    if multiview {
        return TimeoutClass::Multiview;
    }
    match operation.kind() {
        JobKind::Image => TimeoutClass::Image,
        JobKind::Model => TimeoutClass::TextOrImageToModel,
    }
}

fn operation_slug(operation: Operation) -> &'static str {
    match operation {
        Operation::TextToImage => "text_to_image",
        Operation::ImageToImage => "image_to_image",
        Operation::SketchToImage => "sketch_to_image",
        Operation::RemoveBackground => "remove_background",
        Operation::Inpaint => "inpaint",
        Operation::SearchAndRecolor => "search_and_recolor",
        Operation::Upscale => "upscale",
        Operation::Downscale => "downscale",
        Operation::TextToModel => "text_to_model",
        Operation::ImageToModel => "image_to_model",
        Operation::RefineModel => "refine_model",
    }
}

/// `models/{client_task_id}/model.glb` for every model job; images are named
/// after the provider and operation that produced them so repeated
/// submissions of the same (kind, client_task_id) don't collide.
fn logical_name_for(spec: &ExecuteProviderJob, content_type: &str) -> String {
    match spec.operation.kind() {
        JobKind::Model => "model.glb".to_string(),
        JobKind::Image => {
            let ext = match content_type {
                "image/jpeg" => "jpg",
                "image/webp" => "webp",
                _ => "png",
            };
            format!("{}_{}.{ext}", spec.provider.as_str(), operation_slug(spec.operation))
        }
    }
}

/// Same naming scheme as `logical_name_for`, with an index suffix so a
/// multi-artifact response's extras don't collide with the primary blob or
/// each other.
fn extra_logical_name_for(spec: &ExecuteProviderJob, content_type: &str, index: usize) -> String {
    let ext = match content_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    };
    format!("{}_{}_extra_{index}.{ext}", spec.provider.as_str(), operation_slug(spec.operation))
}

fn build_inputs(spec: &ExecuteProviderJob) -> GatewayResult<DriverInputs> {
    let decode = |b64: &str, what: &str| {
        base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| GatewayError::InvalidRequest(format!("invalid {what}: {e}")))
    };
    let bytes = spec.input_bytes_b64.as_deref().map(|b| decode(b, "input_bytes_b64")).transpose()?;
    let mask_bytes = spec.mask_bytes_b64.as_deref().map(|b| decode(b, "mask_bytes_b64")).transpose()?;

    Ok(DriverInputs {
        bytes,
        mask_bytes,
        filename: spec.input_filename.clone(),
        image_urls: spec.image_urls.clone(),
        multiview: spec.multiview,
        params: spec.params.clone().into_iter().collect(),
    })
}

fn driver_for(spec: &ExecuteProviderJob, ctx: &ExecutionContext) -> GatewayResult<Arc<dyn Driver>> {
    if spec.operation == Operation::Downscale {
        return Ok(ctx.local_image_driver.clone());
    }
    ctx.drivers
        .get(spec.provider)
        .ok_or_else(|| GatewayError::InvalidRequest(format!("no driver registered for provider {:?}", spec.provider)))
}

/// Writes `failed` with `metadata.error = reason`. Tolerant of a job that's
/// already terminal (a redelivered task racing a prior worker's finalize) —
/// that's not a new failure, just a no-op.
async fn fail_job(ctx: &ExecutionContext, job_id: Uuid, reason: impl Into<String>) -> GatewayResult<()> {
    let reason = reason.into();
    warn!(%job_id, %reason, "job failed");
    match ctx
        .job_store
        .update_job(job_id, JobPatch::default().status(JobStatus::Failed).metadata("error", reason))
        .await
    {
        Ok(()) => Ok(()),
        Err(GatewayError::PersistenceError(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

#[instrument(skip(spec, ctx), fields(job_id = %spec.job_id, provider = spec.provider.as_str(), operation = ?spec.operation))]
pub async fn run_lifecycle(spec: &ExecuteProviderJob, ctx: &ExecutionContext) -> GatewayResult<()> {
    // Step 1: Setup.
    let job = ctx.job_store.get_job(spec.job_id).await?;
    if job.status.is_terminal() {
        info!("job already terminal, redelivered task is a no-op");
        return Ok(());
    }
    if job.status == JobStatus::Pending {
        ctx.job_store
            .update_job(spec.job_id, JobPatch::default().status(JobStatus::Processing))
            .await?;
    }

    let driver = driver_for(spec, ctx)?;
    let inputs = build_inputs(spec)?;

    // Step 2: Submit.
    let outcome = match driver.submit(spec.operation, inputs).await {
        Ok(outcome) => outcome,
        Err(e) => return fail_job(ctx, spec.job_id, GatewayError::from(e).public_summary()).await,
    };

    let mut extra_artifacts: Vec<ExtraArtifact> = Vec::new();
    let artifact = match outcome {
        DriverOutcome::Synchronous { bytes, content_type, extra } => {
            extra_artifacts = extra;
            ReadyArtifact::Bytes(bytes, content_type)
        }
        DriverOutcome::Failed { reason } => return fail_job(ctx, spec.job_id, reason).await,
        DriverOutcome::RemoteTask { provider_task_id, poll_url } => {
            ctx.job_store
                .update_job(spec.job_id, JobPatch::default().ai_service_task_id(provider_task_id.clone()))
                .await?;

            // Step 3: Poll loop.
            match poll_until_ready(driver.as_ref(), spec, ctx, &provider_task_id, poll_url.as_deref()).await? {
                PollOutcome::Ready(artifact) => artifact,
                PollOutcome::Failed(reason) => return fail_job(ctx, spec.job_id, reason).await,
                PollOutcome::Timeout => return fail_job(ctx, spec.job_id, "timeout").await,
            }
        }
    };

    let artifact = match artifact {
        ReadyArtifact::Bytes(bytes, _) if bytes.is_empty() => {
            return fail_job(ctx, spec.job_id, "no_artifact_url").await
        }
        ReadyArtifact::Url(url) if url.is_empty() => {
            return fail_job(ctx, spec.job_id, "no_artifact_url").await
        }
        other => other,
    };

    // Step 4: Ingest.
    let asset_type_plural = spec.operation.kind().asset_type_plural();
    let blob_url = match artifact {
        ReadyArtifact::Bytes(bytes, content_type) => {
            let logical_name = logical_name_for(spec, &content_type);
            ctx.artifacts
                .ingest_inline_bytes(asset_type_plural, &job.client_task_id, bytes, &content_type, &logical_name)
                .await
        }
        ReadyArtifact::Url(url) => {
            let logical_name = logical_name_for(spec, "");
            let timeout = match spec.provider {
                Provider::Tripo => ctx.settings.tripo_download_timeout(),
                _ => ctx.settings.http_timeout_upload(),
            };
            ctx.artifacts
                .ingest_from_url(asset_type_plural, &job.client_task_id, &url, &logical_name, timeout)
                .await
        }
    };
    let blob_url = match blob_url {
        Ok(url) => url,
        Err(e) => return fail_job(ctx, spec.job_id, GatewayError::from(e).public_summary()).await,
    };

    let mut extra_urls = Vec::with_capacity(extra_artifacts.len());
    for (index, artifact) in extra_artifacts.into_iter().enumerate() {
        let logical_name = extra_logical_name_for(spec, &artifact.content_type, index);
        match ctx
            .artifacts
            .ingest_inline_bytes(asset_type_plural, &job.client_task_id, artifact.bytes, &artifact.content_type, &logical_name)
            .await
        {
            Ok(url) => extra_urls.push(url),
            Err(e) => return fail_job(ctx, spec.job_id, GatewayError::from(e).public_summary()).await,
        }
    }

    // Step 5: Finalize.
    let mut patch = JobPatch::default().status(JobStatus::Complete).asset_url(blob_url);
    if !extra_urls.is_empty() {
        patch = patch.extra_asset_urls(extra_urls);
    }
    ctx.job_store.update_job(spec.job_id, patch).await?;
    info!("job complete");
    Ok(())
}

/// Repeatedly calls `Driver::poll` until it reports `Ready`, `Failed`, the
/// deadline elapses, or the call itself errors (folded into `Failed` — a
/// transport hiccup against an in-flight provider task is not retried by
/// this job type, so there's nothing to gain by propagating it further).
async fn poll_until_ready(
    driver: &dyn Driver,
    spec: &ExecuteProviderJob,
    ctx: &ExecutionContext,
    provider_task_id: &str,
    poll_url: Option<&str>,
) -> GatewayResult<PollOutcome> {
    let interval = poll_interval_for(spec.provider, &ctx.settings);
    let deadline = ctx.settings.total_timeout(timeout_class_for(spec.operation, spec.multiview));
    let started = Instant::now();

    loop {
        if started.elapsed() >= deadline {
            return Ok(PollOutcome::Timeout);
        }

        let result = match driver.poll(spec.operation, provider_task_id, poll_url).await {
            Ok(result) => result,
            Err(e) => return Ok(PollOutcome::Failed(GatewayError::from(e).public_summary())),
        };

        match result {
            PollResult::InProgress { progress_percent } => {
                ctx.job_store
                    .update_job(spec.job_id, JobPatch::default().metadata("progress", progress_percent))
                    .await?;
            }
            PollResult::Ready { artifact_ref } => {
                return Ok(PollOutcome::Ready(match artifact_ref {
                    ArtifactRef::Url(url) => ReadyArtifact::Url(url),
                    ArtifactRef::Bytes(bytes, content_type) => {
                        ReadyArtifact::Bytes(bytes, content_type.unwrap_or_else(|| "application/octet-stream".to_string()))
                    }
                }));
            }
            PollResult::Failed { reason } => return Ok(PollOutcome::Failed(reason)),
        }

        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Ok(PollOutcome::Timeout);
        }
        tokio::time::sleep(interval.min(remaining)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;

    use gateway_blob::{ArtifactPipeline, InMemoryBlobStore};
    use gateway_core::config::GatewayConfig;
    use gateway_core::job::{Job, JobStatus, Operation, Provider};
    use gateway_core::store::{InMemoryJobStore, JobStore};
    use gateway_drivers::{DriverCapabilities, DriverError};

    use super::*;

    /// A scripted `Driver` whose `submit`/`poll` behavior is fixed per test.
    struct MockDriver {
        submit_result: std::sync::Mutex<Option<DriverResult<DriverOutcome>>>,
        poll_results: std::sync::Mutex<Vec<DriverResult<PollResult>>>,
        poll_calls: AtomicUsize,
    }

    type DriverResult<T> = Result<T, DriverError>;

    impl MockDriver {
        fn synchronous(outcome: DriverOutcome) -> Self {
            Self {
                submit_result: std::sync::Mutex::new(Some(Ok(outcome))),
                poll_results: std::sync::Mutex::new(Vec::new()),
                poll_calls: AtomicUsize::new(0),
            }
        }

        fn remote(poll_results: Vec<DriverResult<PollResult>>) -> Self {
            Self {
                submit_result: std::sync::Mutex::new(Some(Ok(DriverOutcome::RemoteTask {
                    provider_task_id: "task-1".to_string(),
                    poll_url: None,
                }))),
                poll_results: std::sync::Mutex::new(poll_results),
                poll_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Driver for MockDriver {
        async fn submit(&self, _operation: Operation, _inputs: DriverInputs) -> DriverResult<DriverOutcome> {
            self.submit_result.lock().unwrap().take().expect("submit called more than once")
        }

        async fn poll(&self, _operation: Operation, _provider_task_id: &str, _poll_url: Option<&str>) -> DriverResult<PollResult> {
            let idx = self.poll_calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.poll_results.lock().unwrap();
            if idx < results.len() {
                std::mem::replace(&mut results[idx], Err(DriverError::UnexpectedResponse("exhausted".to_string())))
            } else {
                Err(DriverError::UnexpectedResponse("no more scripted poll results".to_string()))
            }
        }

        fn capabilities(&self, _operation: Operation) -> DriverCapabilities {
            DriverCapabilities {
                needs_input_bytes: false,
                is_synchronous: false,
                artifact_content_type_hint: None,
            }
        }
    }

    fn test_context(driver: Arc<dyn Driver>, settings: GatewaySettings) -> (ExecutionContext, Arc<InMemoryJobStore>) {
        let job_store = InMemoryJobStore::new();
        let blob_store = InMemoryBlobStore::new(true);
        let artifacts = Arc::new(ArtifactPipeline::new(blob_store, false));
        let ctx = ExecutionContext {
            job_store: job_store.clone(),
            artifacts,
            drivers: Arc::new(DriverRegistry::new().with_driver(Provider::Stability, driver.clone())),
            settings: Arc::new(settings),
            local_image_driver: driver,
        };
        (ctx, job_store)
    }

    fn spec_for(job_id: Uuid, operation: Operation) -> ExecuteProviderJob {
        ExecuteProviderJob {
            job_id,
            provider: Provider::Stability,
            operation,
            params: Default::default(),
            input_bytes_b64: None,
            mask_bytes_b64: None,
            input_filename: None,
            image_urls: Vec::new(),
            multiview: false,
        }
    }

    #[tokio::test]
    async fn synchronous_success_completes_job() {
        let driver = Arc::new(MockDriver::synchronous(DriverOutcome::Synchronous {
            bytes: vec![1, 2, 3],
            content_type: "image/png".to_string(),
            extra: Vec::new(),
        }));
        let (ctx, job_store) = test_context(driver, GatewayConfig::new().snapshot());

        let job = Job::new("client-1", "tenant-a", Provider::Stability, Operation::TextToImage, Utc::now());
        let job_id = job.id;
        job_store.create_job(job).await.unwrap();

        let spec = spec_for(job_id, Operation::TextToImage);
        run_lifecycle(&spec, &ctx).await.unwrap();

        let finished = job_store.get_job(job_id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Complete);
        assert!(!finished.asset_url.is_empty());
    }

    #[tokio::test]
    async fn synchronous_failure_marks_job_failed() {
        let driver = Arc::new(MockDriver::synchronous(DriverOutcome::Failed {
            reason: "provider rejected the prompt".to_string(),
        }));
        let (ctx, job_store) = test_context(driver, GatewayConfig::new().snapshot());

        let job = Job::new("client-2", "tenant-a", Provider::Stability, Operation::TextToImage, Utc::now());
        let job_id = job.id;
        job_store.create_job(job).await.unwrap();

        let spec = spec_for(job_id, Operation::TextToImage);
        run_lifecycle(&spec, &ctx).await.unwrap();

        let finished = job_store.get_job(job_id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert_eq!(finished.metadata.get("error").unwrap(), "provider rejected the prompt");
    }

    #[tokio::test]
    async fn remote_task_polls_to_ready_then_completes() {
        let driver = Arc::new(MockDriver::remote(vec![
            Ok(PollResult::InProgress { progress_percent: 40 }),
            Ok(PollResult::Ready {
                artifact_ref: ArtifactRef::Bytes(vec![9, 9, 9], Some("image/png".to_string())),
            }),
        ]));
        let (ctx, job_store) = test_context(driver, GatewayConfig::new().snapshot());

        let job = Job::new("client-3", "tenant-a", Provider::Stability, Operation::ImageToModel, Utc::now());
        let job_id = job.id;
        job_store.create_job(job).await.unwrap();

        let spec = spec_for(job_id, Operation::ImageToModel);
        run_lifecycle(&spec, &ctx).await.unwrap();

        let finished = job_store.get_job(job_id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Complete);
        assert_eq!(finished.ai_service_task_id.as_deref(), Some("task-1"));
    }

    #[tokio::test]
    async fn remote_task_failure_marks_job_failed() {
        let driver = Arc::new(MockDriver::remote(vec![Ok(PollResult::Failed {
            reason: "upstream rendering error".to_string(),
        })]));
        let (ctx, job_store) = test_context(driver, GatewayConfig::new().snapshot());

        let job = Job::new("client-4", "tenant-a", Provider::Stability, Operation::ImageToModel, Utc::now());
        let job_id = job.id;
        job_store.create_job(job).await.unwrap();

        let spec = spec_for(job_id, Operation::ImageToModel);
        run_lifecycle(&spec, &ctx).await.unwrap();

        let finished = job_store.get_job(job_id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert_eq!(finished.metadata.get("error").unwrap(), "upstream rendering error");
    }

    #[tokio::test]
    async fn remote_task_timeout_marks_job_failed() {
        // total_timeout_model_seconds=0 makes the very first deadline check
        // fire before the loop ever polls or sleeps.
        let mut cfg = GatewayConfig::new();
        cfg.set("total_timeout_model_seconds", "0");
        let driver = Arc::new(MockDriver::remote(vec![Ok(PollResult::InProgress { progress_percent: 0 })]));
        let (ctx, job_store) = test_context(driver, cfg.snapshot());

        let job = Job::new("client-5", "tenant-a", Provider::Stability, Operation::ImageToModel, Utc::now());
        let job_id = job.id;
        job_store.create_job(job).await.unwrap();

        let spec = spec_for(job_id, Operation::ImageToModel);
        run_lifecycle(&spec, &ctx).await.unwrap();

        let finished = job_store.get_job(job_id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert_eq!(finished.metadata.get("error").unwrap(), "timeout");
    }

    #[tokio::test]
    async fn already_terminal_job_is_a_no_op() {
        let driver = Arc::new(MockDriver::synchronous(DriverOutcome::Synchronous {
            bytes: vec![1],
            content_type: "image/png".to_string(),
            extra: Vec::new(),
        }));
        let (ctx, job_store) = test_context(driver, GatewayConfig::new().snapshot());

        let job = Job::new("client-6", "tenant-a", Provider::Stability, Operation::TextToImage, Utc::now());
        let job_id = job.id;
        job_store.create_job(job).await.unwrap();
        job_store
            .update_job(job_id, gateway_core::store::JobPatch::default().status(JobStatus::Processing))
            .await
            .unwrap();
        job_store
            .update_job(
                job_id,
                gateway_core::store::JobPatch::default()
                    .status(JobStatus::Failed)
                    .metadata("error", "already done"),
            )
            .await
            .unwrap();

        let spec = spec_for(job_id, Operation::TextToImage);
        run_lifecycle(&spec, &ctx).await.unwrap();

        let finished = job_store.get_job(job_id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert_eq!(finished.metadata.get("error").unwrap(), "already done");
    }

    #[tokio::test]
    async fn empty_artifact_bytes_surface_as_no_artifact_url() {
        let driver = Arc::new(MockDriver::synchronous(DriverOutcome::Synchronous {
            bytes: Vec::new(),
            content_type: "image/png".to_string(),
            extra: Vec::new(),
        }));
        let (ctx, job_store) = test_context(driver, GatewayConfig::new().snapshot());

        let job = Job::new("client-7", "tenant-a", Provider::Stability, Operation::TextToImage, Utc::now());
        let job_id = job.id;
        job_store.create_job(job).await.unwrap();

        let spec = spec_for(job_id, Operation::TextToImage);
        run_lifecycle(&spec, &ctx).await.unwrap();

        let finished = job_store.get_job(job_id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert_eq!(finished.metadata.get("error").unwrap(), "no_artifact_url");
    }

    #[tokio::test]
    async fn extra_artifacts_are_ingested_and_recorded_on_the_job() {
        let driver = Arc::new(MockDriver::synchronous(DriverOutcome::Synchronous {
            bytes: vec![1, 2, 3],
            content_type: "image/png".to_string(),
            extra: vec![
                ExtraArtifact { bytes: vec![4, 5, 6], content_type: "image/png".to_string() },
                ExtraArtifact { bytes: vec![7, 8, 9], content_type: "image/png".to_string() },
            ],
        }));
        let (ctx, job_store) = test_context(driver, GatewayConfig::new().snapshot());

        let job = Job::new("client-8", "tenant-a", Provider::Stability, Operation::TextToImage, Utc::now());
        let job_id = job.id;
        job_store.create_job(job).await.unwrap();

        let spec = spec_for(job_id, Operation::TextToImage);
        run_lifecycle(&spec, &ctx).await.unwrap();

        let finished = job_store.get_job(job_id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Complete);
        let extra_urls = finished.metadata.get("extra_asset_urls").unwrap().as_array().unwrap();
        assert_eq!(extra_urls.len(), 2);
    }
}
