//! Builds the Axum router: the submit routes behind `X-API-Key` auth, the
//! status route behind the lighter optional-auth layer, request-id
//! propagation, and HTTP tracing.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::{require_api_key, resolve_tenant_optional};
use crate::routes::{status_router, submit_router};
use crate::state::AppState;

async fn ensure_request_id(req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");
    let mut req = req;
    let request_id = req
        .headers()
        .get(&header_name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if req.headers().get(&header_name).is_none() {
        if let Ok(v) = HeaderValue::from_str(&request_id) {
            req.headers_mut().insert(header_name.clone(), v);
        }
    }

    let mut res = next.run(req).await;
    if res.headers().get(&header_name).is_none() {
        if let Ok(v) = HeaderValue::from_str(&request_id) {
            res.headers_mut().insert(header_name, v);
        }
    }
    res
}

pub fn build_router(state: AppState) -> Router {
    let submit = submit_router().route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));
    let status = status_router().route_layer(middleware::from_fn_with_state(state.clone(), resolve_tenant_optional));

    Router::new()
        .merge(submit)
        .merge(status)
        .with_state(state)
        .layer(middleware::from_fn(ensure_request_id))
        .layer(TraceLayer::new_for_http())
}
