//! # gateway-orchestrator: the job lifecycle engine
//!
//! Wires the Job Store Adapter, Artifact Pipeline, and per-provider drivers
//! together behind the two entry points the HTTP adapter calls:
//! [`Orchestrator::submit_job`] and [`Orchestrator::get_job_status`]. The
//! per-job state machine itself — submit, poll, ingest, finalize — runs as
//! a queued [`job::ExecuteProviderJob`], executed by `gateway-queue`'s
//! worker runtime.

pub mod context;
pub mod job;
pub mod lifecycle;
pub mod orchestrator;
pub mod request;

pub use context::{DriverRegistry, ExecutionContext};
pub use job::ExecuteProviderJob;
pub use orchestrator::Orchestrator;
pub use request::{provider_supports_operation, validate_operation_constraints, ProviderClass, StatusView, SubmitRequest, TaskHandle};
