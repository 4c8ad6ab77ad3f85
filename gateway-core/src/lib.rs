//! gateway-core: the Job envelope, tenant context, canonical error taxonomy,
//! configuration, and the Job Store Adapter (C3) for the generative-media
//! orchestration gateway.

pub mod config;
pub mod error;
pub mod job;
pub mod routing;
pub mod store;
pub mod tenant;

pub use config::{GatewayConfig, GatewaySettings, TimeoutClass};
pub use error::{GatewayError, GatewayResult};
pub use job::{Job, JobKind, JobStatus, Operation, Provider, PENDING_ASSET_URL};
pub use routing::{queue_for, QueueName};
pub use store::{InMemoryJobStore, JobPatch, JobStore};
pub use tenant::{is_valid_shopify_identifier, TenantContext, TenantId, TenantType};
