//! gateway-http: the HTTP adapter for the generative-media orchestration
//! gateway. Exposes one submit endpoint per `(kind, operation)` pair and a
//! single status endpoint, both delegating straight to
//! `gateway_orchestrator::Orchestrator`.

pub mod app;
pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use app::build_router;
pub use error::GatewayHttpError;
pub use state::AppState;
