use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Per-request identity. Submissions adopt the request id as the job identifier.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub request_id: Uuid,
}

/// Assign a fresh v4 id to every request and echo it in `x-request-id`.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext {
        request_id: Uuid::new_v4(),
    };
    request.extensions_mut().insert(ctx);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id);
    let start = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();

    if status.is_success() {
        debug!(
            target = "pressroom::http::response",
            status = status.as_u16(),
            method = %method,
            path = path.as_str(),
            elapsed_ms,
            "request completed"
        );
        return response;
    }

    let report = response.extensions_mut().remove::<ErrorReport>();
    log_failure(status, &method, &path, request_id, elapsed_ms, report);
    response
}

fn log_failure(
    status: StatusCode,
    method: &Method,
    path: &str,
    request_id: Option<Uuid>,
    elapsed_ms: u128,
    report: Option<ErrorReport>,
) {
    let request_id = request_id.map(|id| id.to_string()).unwrap_or_default();
    let (source, detail, messages) = match &report {
        Some(report) => (report.source, report.detail(), report.messages.as_slice()),
        None => ("unknown", "no diagnostic available", &[][..]),
    };

    if status.is_server_error() {
        error!(
            target = "pressroom::http::response",
            status = status.as_u16(),
            method = %method,
            path,
            elapsed_ms,
            source,
            detail,
            chain = ?messages,
            request_id = request_id.as_str(),
            "request failed"
        );
    } else if status.is_client_error() {
        warn!(
            target = "pressroom::http::response",
            status = status.as_u16(),
            method = %method,
            path,
            elapsed_ms,
            source,
            detail,
            request_id = request_id.as_str(),
            "request rejected"
        );
    }
}
