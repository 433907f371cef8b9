use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, debug, error, info_span, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_FORWARDED_ID_LEN: usize = 64;

/// Request id assigned at the edge, available to handlers as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Keeps a caller supplied id when it is a short token, otherwise mints one.
fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| {
            !id.is_empty()
                && id.len() <= MAX_FORWARDED_ID_LEN
                && id
                    .bytes()
                    .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_')
        })
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Runs each request inside a span carrying its id, echoes the id back and
/// logs the outcome. Failed responses are logged with the `ErrorReport` the
/// handler attached.
pub async fn trace_requests(mut request: Request<Body>, next: Next) -> Response {
    let id = request_id(request.headers());
    let span = info_span!(
        target: "teebox::http",
        "request",
        request_id = %id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    request.extensions_mut().insert(RequestId(id.clone()));

    let start = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let status = response.status();
    let report = response.extensions_mut().remove::<ErrorReport>();
    span.in_scope(|| log_outcome(status, elapsed_ms, report));
    response
}

fn log_outcome(status: StatusCode, elapsed_ms: u64, report: Option<ErrorReport>) {
    if !(status.is_client_error() || status.is_server_error()) {
        debug!(
            target = "teebox::http::response",
            status = status.as_u16(),
            elapsed_ms,
            "request completed"
        );
        return;
    }

    let (source, chain) = report
        .map(|report| (report.source, report.messages))
        .unwrap_or(("unknown", Vec::new()));
    let detail = chain.first().map_or("no diagnostic available", String::as_str);

    if status.is_server_error() {
        error!(
            target = "teebox::http::response",
            status = status.as_u16(),
            elapsed_ms,
            source,
            detail,
            chain = ?chain,
            "request failed"
        );
    } else {
        warn!(
            target = "teebox::http::response",
            status = status.as_u16(),
            elapsed_ms,
            source,
            detail,
            "client request error"
        );
    }
}

#[cfg(test)]
mod tests {
    use axum::{Extension, Router, middleware, routing::get};
    use tower::ServiceExt;

    use super::*;
    use crate::application::error::HttpError;

    fn app() -> Router {
        Router::new()
            .route(
                "/echo",
                get(|Extension(RequestId(id)): Extension<RequestId>| async move { id }),
            )
            .route(
                "/missing",
                get(|| async { HttpError::not_found("tests::missing", "nothing here") }),
            )
            .layer(middleware::from_fn(trace_requests))
    }

    fn header(response: &Response) -> String {
        response.headers()[REQUEST_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn mints_an_id_and_exposes_it_to_handlers() {
        let response = app()
            .oneshot(Request::get("/echo").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = header(&response);
        assert!(Uuid::parse_str(&id).is_ok());
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(body, id.as_bytes());
    }

    #[tokio::test]
    async fn forwards_a_well_formed_caller_id() {
        let response = app()
            .oneshot(
                Request::get("/missing")
                    .header(REQUEST_ID_HEADER, "edge-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(header(&response), "edge-42");
        assert!(response.extensions().get::<ErrorReport>().is_none());
    }

    #[test]
    fn malformed_caller_ids_are_replaced() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("a b;c"));
        assert!(Uuid::parse_str(&request_id(&headers)).is_ok());

        let long = "x".repeat(MAX_FORWARDED_ID_LEN + 1);
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(&long).unwrap());
        assert_ne!(request_id(&headers), long);
    }
}
