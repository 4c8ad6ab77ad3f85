//! Maps [`GatewayError`] onto an HTTP response. Every handler in this crate
//! returns `Result<_, GatewayHttpError>`, so this is the one place the
//! status-code mapping lives.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use gateway_core::error::GatewayError;

#[derive(Debug)]
pub struct GatewayHttpError(pub GatewayError);

impl From<GatewayError> for GatewayHttpError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for GatewayHttpError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.recommended_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({ "error": self.0.public_summary() }));
        (status, body).into_response()
    }
}
