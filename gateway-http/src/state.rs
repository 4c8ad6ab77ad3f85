//! Shared Axum state: the orchestrator plus the auth configuration the
//! `auth` middleware consults.

use std::sync::Arc;

use gateway_core::error::GatewayResult;
use gateway_core::tenant::TenantId;
use gateway_orchestrator::Orchestrator;
use gateway_queue::backend::memory::storage::MemoryBackend;
use gateway_queue::WorkerHandle;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator<MemoryBackend>>,
    /// The value an `X-API-Key` header must match. `None` means no key is
    /// configured at all, which is only meaningful alongside `dev_mode`.
    pub api_key: Option<String>,
    /// When true, a request with no (or a non-matching) `X-API-Key` is
    /// still let through as the development tenant rather than rejected.
    pub dev_mode: bool,
    /// Kept alive for the lifetime of `AppState`; dropping this would not
    /// stop the workers (tokio tasks run detached), but holding on to the
    /// handles keeps the door open for a future graceful-shutdown path.
    _workers: Arc<Vec<WorkerHandle>>,
}

impl AppState {
    /// Starts the Worker Runtime (C4) for the development tenant alongside
    /// storing the orchestrator, so jobs submitted in dev mode actually run
    /// to completion instead of sitting `processing` forever. A deployment
    /// serving more than the development tenant needs its own call to
    /// `orchestrator.start_workers(tenant_id)` per tenant it expects to run
    /// workers for — the in-memory queue backend partitions dequeue by
    /// tenant, so one worker pool only ever drains one tenant's queues.
    pub async fn new(orchestrator: Arc<Orchestrator<MemoryBackend>>, api_key: Option<String>, dev_mode: bool) -> GatewayResult<Self> {
        let workers = orchestrator.start_workers(TenantId::development().as_str()).await?;
        Ok(Self {
            orchestrator,
            api_key,
            dev_mode,
            _workers: Arc::new(workers),
        })
    }
}
