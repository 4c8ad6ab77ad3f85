//! # gateway-drivers: per-provider adapters for the generative-media gateway
//!
//! One [`Driver`] implementation per provider (OpenAI, Stability, Recraft,
//! Flux, Tripo), each translating the gateway's generic submit/poll contract
//! into that provider's own wire format, plus one local driver for the
//! operations that have no provider at all. Drivers never retry on their
//! own: a 4xx response is terminal for the job, a 5xx or transport failure
//! folds into [`gateway_core::error::GatewayError::UpstreamUnavailable`] for
//! the caller to decide whether the job as a whole should be retried.

pub mod driver;
pub mod error;
pub mod flux;
pub mod local_image;
pub mod openai;
pub mod recraft;
pub mod stability;
pub mod tripo;

pub use driver::{ArtifactRef, Driver, DriverCapabilities, DriverInputs, DriverOutcome, ExtraArtifact, PollResult};
pub use error::{DriverError, DriverResult};
pub use flux::FluxDriver;
pub use local_image::LocalImageDriver;
pub use openai::OpenAiDriver;
pub use recraft::RecraftDriver;
pub use stability::StabilityDriver;
pub use tripo::TripoDriver;
