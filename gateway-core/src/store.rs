//! The Job Store Adapter (C3): creates, updates, and reads the durable Job
//! record. The real backing store (a relational/document database)
//! lives outside this crate; [`InMemoryJobStore`] is the reference
//! implementation used by tests and by the Orchestrator's own test harness.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::job::{Job, JobStatus};

/// A partial update to a Job. `None` fields are left untouched;
/// `metadata_patch` entries are merged into the existing map rather than
/// replacing it wholesale.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub ai_service_task_id: Option<String>,
    pub asset_url: Option<String>,
    pub prompt: Option<String>,
    pub style: Option<String>,
    pub is_public: Option<bool>,
    pub extra_asset_urls: Option<Vec<String>>,
    pub metadata_patch: BTreeMap<String, Value>,
}

impl JobPatch {
    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn ai_service_task_id(mut self, id: impl Into<String>) -> Self {
        self.ai_service_task_id = Some(id.into());
        self
    }

    pub fn asset_url(mut self, url: impl Into<String>) -> Self {
        self.asset_url = Some(url.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata_patch.insert(key.into(), value.into());
        self
    }

    pub fn extra_asset_urls(mut self, urls: Vec<String>) -> Self {
        self.extra_asset_urls = Some(urls);
        self
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: Job) -> GatewayResult<Uuid>;
    async fn update_job(&self, job_id: Uuid, patch: JobPatch) -> GatewayResult<()>;
    async fn get_job(&self, job_id: Uuid) -> GatewayResult<Job>;
}

/// Reference `JobStore` implementation backed by a `RwLock<HashMap>`, in the
/// same idiom as the Worker Runtime's in-memory queue backend. Production
/// deployments swap this for a real database adapter; the trait above is the
/// only contract the Orchestrator depends on.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(&self, job: Job) -> GatewayResult<Uuid> {
        let id = job.id;
        self.jobs.write().insert(id, job);
        Ok(id)
    }

    async fn update_job(&self, job_id: Uuid, patch: JobPatch) -> GatewayResult<()> {
        let mut guard = self.jobs.write();
        let job = guard
            .get_mut(&job_id)
            .ok_or_else(|| GatewayError::PersistenceError(format!("no such job: {job_id}")))?;
        apply_patch(job, patch, Utc::now())
    }

    async fn get_job(&self, job_id: Uuid) -> GatewayResult<Job> {
        self.jobs
            .read()
            .get(&job_id)
            .cloned()
            .ok_or_else(|| GatewayError::PersistenceError(format!("no such job: {job_id}")))
    }
}

fn apply_patch(job: &mut Job, patch: JobPatch, now: DateTime<Utc>) -> GatewayResult<()> {
    if let Some(status) = patch.status {
        job.transition_to(status, now)?;
    }
    if let Some(id) = patch.ai_service_task_id {
        job.set_provider_task_id(id, now);
    }
    if let Some(url) = patch.asset_url {
        job.asset_url = url;
        job.updated_at = now;
    }
    if let Some(prompt) = patch.prompt {
        job.prompt = Some(prompt);
    }
    if let Some(style) = patch.style {
        job.style = Some(style);
    }
    if let Some(is_public) = patch.is_public {
        job.is_public = is_public;
    }
    if let Some(urls) = patch.extra_asset_urls {
        job.record_extra_asset_urls(urls);
    }
    for (k, v) in patch.metadata_patch {
        job.metadata.insert(k, v);
    }
    Ok(())
}
