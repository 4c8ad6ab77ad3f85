//! The Job envelope and its status state machine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Image,
    Model,
}

impl JobKind {
    /// `images` or `models`.
    pub fn asset_type_plural(&self) -> &'static str {
        match self {
            JobKind::Image => "images",
            JobKind::Model => "models",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    OpenAi,
    Stability,
    Recraft,
    Flux,
    Tripo,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Stability => "stability",
            Provider::Recraft => "recraft",
            Provider::Flux => "flux",
            Provider::Tripo => "tripo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    TextToImage,
    ImageToImage,
    SketchToImage,
    RemoveBackground,
    Inpaint,
    SearchAndRecolor,
    Upscale,
    Downscale,
    TextToModel,
    ImageToModel,
    RefineModel,
}

impl Operation {
    pub fn kind(&self) -> JobKind {
        match self {
            Operation::TextToImage
            | Operation::ImageToImage
            | Operation::SketchToImage
            | Operation::RemoveBackground
            | Operation::Inpaint
            | Operation::SearchAndRecolor
            | Operation::Upscale
            | Operation::Downscale => JobKind::Image,
            Operation::TextToModel | Operation::ImageToModel | Operation::RefineModel => JobKind::Model,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl JobStatus {
    /// Legal transitions: `pending -> processing -> {complete|failed}` and
    /// `pending -> failed`; terminal states never transition further.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Failed) | (Processing, Complete) | (Processing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

/// The placeholder value held in `asset_url` before a job completes.
pub const PENDING_ASSET_URL: &str = "pending";

/// The Job envelope shared by `ImageJob` and `ModelJob`. Both kinds use the
/// same Rust type; `kind` distinguishes them at the storage layer (two
/// separate tables/collections).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub client_task_id: String,
    pub tenant_id: String,
    pub kind: JobKind,
    pub provider: Provider,
    pub operation: Operation,
    pub status: JobStatus,
    pub prompt: Option<String>,
    pub style: Option<String>,
    pub source_asset_url: Option<String>,
    pub ai_service_task_id: Option<String>,
    pub asset_url: String,
    pub metadata: BTreeMap<String, Value>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        client_task_id: impl Into<String>,
        tenant_id: impl Into<String>,
        provider: Provider,
        operation: Operation,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_task_id: client_task_id.into(),
            tenant_id: tenant_id.into(),
            kind: operation.kind(),
            provider,
            operation,
            status: JobStatus::Pending,
            prompt: None,
            style: None,
            source_asset_url: None,
            ai_service_task_id: None,
            asset_url: PENDING_ASSET_URL.to_string(),
            metadata: BTreeMap::new(),
            is_public: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a validated status transition. Callers outside this crate
    /// should go through [`JobPatch`] / a `JobStore` implementation rather
    /// than mutate `status` directly.
    pub fn transition_to(&mut self, next: JobStatus, now: DateTime<Utc>) -> GatewayResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(GatewayError::PersistenceError(format!(
                "illegal status transition {:?} -> {:?}",
                self.status, next
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Invariant 4: once set, `ai_service_task_id` is never cleared, only
    /// replaced (a refine chain may assign a newer provider task id).
    pub fn set_provider_task_id(&mut self, id: impl Into<String>, now: DateTime<Utc>) {
        self.ai_service_task_id = Some(id.into());
        self.updated_at = now;
    }

    pub fn set_progress(&mut self, progress_percent: u8) {
        self.metadata
            .insert("progress".to_string(), Value::from(progress_percent));
    }

    pub fn set_error(&mut self, summary: impl Into<String>) {
        self.metadata.insert("error".to_string(), Value::String(summary.into()));
    }

    pub fn record_extra_asset_urls(&mut self, urls: Vec<String>) {
        if !urls.is_empty() {
            self.metadata
                .insert("extra_asset_urls".to_string(), Value::from(urls));
        }
    }

    /// Marks the job complete with its final asset URL. Idempotent: calling
    /// this twice on an already-complete job with the same `blob_url` is a
    /// no-op on observable state.
    pub fn finalize(&mut self, blob_url: impl Into<String>, now: DateTime<Utc>) -> GatewayResult<()> {
        if self.status == JobStatus::Complete {
            return Ok(());
        }
        self.asset_url = blob_url.into();
        self.transition_to(JobStatus::Complete, now)
    }

    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> GatewayResult<()> {
        if self.status.is_terminal() {
            return Ok(());
        }
        self.set_error(reason);
        self.transition_to(JobStatus::Failed, now)
    }
}
