//! Shared state handed to every running job. All fields are `Arc`-wrapped so
//! `ExecutionContext` can be cloned cheaply into each worker's queue context
//! and into the HTTP layer's submission path alike.

use std::sync::Arc;

use gateway_blob::ArtifactPipeline;
use gateway_core::job::Provider;
use gateway_core::store::JobStore;
use gateway_core::GatewaySettings;
use gateway_drivers::Driver;

/// Maps a job's `Provider` to the driver instance that talks to it.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: Vec<(Provider, Arc<dyn Driver>)>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_driver(mut self, provider: Provider, driver: Arc<dyn Driver>) -> Self {
        self.drivers.push((provider, driver));
        self
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn Driver>> {
        self.drivers
            .iter()
            .find(|(p, _)| *p == provider)
            .map(|(_, d)| d.clone())
    }
}

/// Everything the lifecycle runner needs to take a job from `Pending` to a
/// terminal state. Cloned into `ExecuteProviderJob::Context` for every
/// worker; construction happens once at process startup.
#[derive(Clone)]
pub struct ExecutionContext {
    pub job_store: Arc<dyn JobStore>,
    pub artifacts: Arc<ArtifactPipeline>,
    pub drivers: Arc<DriverRegistry>,
    pub settings: Arc<GatewaySettings>,
    /// Backs `Operation::Downscale`, which has no AI provider of its own;
    /// the job's nominal `provider` field still routes it to a queue and a
    /// rate-limit bucket, but execution always goes through this driver.
    pub local_image_driver: Arc<dyn Driver>,
}
