//! `X-API-Key` authentication, with a development-mode bypass. The tenant
//! API-key store and signing-secret registration flow this would normally
//! consult is an external collaborator this gateway doesn't implement; this
//! middleware only gates the request and resolves a [`TenantContext`] for
//! downstream handlers to read from the request extensions.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;

use gateway_core::error::GatewayError;
use gateway_core::tenant::{TenantContext, TenantType};

use crate::error::GatewayHttpError;
use crate::state::AppState;

fn resolve_tenant(headers: &HeaderMap, dev_mode: bool) -> TenantContext {
    match headers.get("x-tenant-id").and_then(|v| v.to_str().ok()) {
        Some(id) if !id.is_empty() => TenantContext::new(id.to_string(), TenantType::Custom),
        _ if dev_mode => TenantContext::development(),
        _ => TenantContext::new("unknown", TenantType::Custom),
    }
}

/// Rejects the request unless `X-API-Key` matches the configured key, or the
/// adapter is running in development mode. Status queries are not guarded by
/// this middleware (§6.2 allows missing auth there).
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, GatewayHttpError> {
    let presented = req.headers().get("x-api-key").and_then(|v| v.to_str().ok());
    let authorized = match (&state.api_key, presented) {
        (Some(expected), Some(got)) => expected == got,
        _ => false,
    };

    if !authorized && !state.dev_mode {
        return Err(GatewayError::Unauthorized("missing or invalid X-API-Key".to_string()).into());
    }

    let tenant = resolve_tenant(req.headers(), state.dev_mode);
    let mut req = req;
    req.extensions_mut().insert(tenant);
    Ok(next.run(req).await)
}

/// The status endpoint accepts optional or missing auth; it still resolves
/// whatever tenant it can so handlers have a consistent extension to read,
/// but never rejects the request.
pub async fn resolve_tenant_optional(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let tenant = resolve_tenant(req.headers(), state.dev_mode);
    let mut req = req;
    req.extensions_mut().insert(tenant);
    next.run(req).await
}
