//! The canonical error taxonomy. Every component-level error type in
//! the other gateway crates carries a `From` conversion into [`GatewayError`]
//! so that the HTTP adapter has exactly one enum to map to status codes.

use thiserror::Error;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("artifact fetch error: {0}")]
    ArtifactFetchError(String),

    #[error("artifact store error: {0}")]
    ArtifactStoreError(String),

    #[error("provider task failed: {0}")]
    ProviderTaskFailed(String),

    #[error("timeout")]
    Timeout,

    #[error("persistence error: {0}")]
    PersistenceError(String),

    #[error("queue full")]
    QueueFull,
}

impl GatewayError {
    /// The recommended HTTP status mapping. The HTTP adapter is an
    /// external collaborator and is free to diverge, but this is the mapping
    /// this repo's own adapter uses.
    pub fn recommended_status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidRequest(_) => 400,
            GatewayError::Unauthorized(_) => 401,
            GatewayError::UpstreamUnavailable(_) => 502,
            GatewayError::Timeout => 504,
            GatewayError::ArtifactFetchError(_)
            | GatewayError::ArtifactStoreError(_)
            | GatewayError::ProviderTaskFailed(_)
            | GatewayError::PersistenceError(_)
            | GatewayError::QueueFull => 500,
        }
    }

    /// A non-internal summary suitable for `Job.metadata.error` / `StatusView.error`.
    pub fn public_summary(&self) -> String {
        match self {
            GatewayError::ProviderTaskFailed(reason) => reason.clone(),
            GatewayError::Timeout => "timeout".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_spec() {
        assert_eq!(GatewayError::InvalidRequest("x".into()).recommended_status_code(), 400);
        assert_eq!(GatewayError::Unauthorized("x".into()).recommended_status_code(), 401);
        assert_eq!(GatewayError::UpstreamUnavailable("x".into()).recommended_status_code(), 502);
        assert_eq!(GatewayError::Timeout.recommended_status_code(), 504);
        assert_eq!(GatewayError::PersistenceError("x".into()).recommended_status_code(), 500);
    }

    #[test]
    fn timeout_summary_is_the_literal_used_in_metadata() {
        assert_eq!(GatewayError::Timeout.public_summary(), "timeout");
    }
}
