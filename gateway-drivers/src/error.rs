//! Error taxonomy for provider drivers. Every leaf folds into
//! [`gateway_core::error::GatewayError`] for upstream propagation.

use thiserror::Error;

use gateway_core::error::GatewayError;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned an unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("provider task failed: {0}")]
    TaskFailed(String),

    #[error("invalid driver input: {0}")]
    InvalidInput(String),
}

impl From<reqwest::Error> for DriverError {
    fn from(err: reqwest::Error) -> Self {
        DriverError::Transport(err.to_string())
    }
}

impl From<DriverError> for GatewayError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::TaskFailed(reason) => GatewayError::ProviderTaskFailed(reason),
            other => GatewayError::UpstreamUnavailable(other.to_string()),
        }
    }
}
