//! hyper adapter around `RequestRouter`.

use std::convert::Infallible;

use dyntable_core::{Method, RequestRouter, RouteRequest, RouteResponse};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE, LOCATION};
use hyper::{Request, Response, StatusCode};
use log::{error, warn};
use serde_json::json;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Serves one request. Never fails at the transport level; every failure
/// becomes a JSON error response.
pub async fn handle(
    router: RequestRouter,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = Method::parse(req.method().as_str());
    let path = req
        .uri()
        .path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            if err.downcast_ref::<LengthLimitError>().is_some() {
                warn!(
                    "event=request_body module=http status=rejected reason=too_large limit_bytes={}",
                    MAX_BODY_BYTES
                );
                return Ok(plain_error(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "payload_too_large",
                    format!("request body exceeds {MAX_BODY_BYTES} bytes"),
                ));
            }
            warn!("event=request_body module=http status=error error={}", err);
            return Ok(plain_error(
                StatusCode::BAD_REQUEST,
                "body_read_failed",
                err.to_string(),
            ));
        }
    };

    let request = RouteRequest::new(method, path, body.to_vec());
    match tokio::task::spawn_blocking(move || router.dispatch(&request)).await {
        Ok(response) => Ok(into_response(response)),
        Err(err) => {
            error!("event=request_dispatch module=http status=error error={}", err);
            Ok(plain_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "request handler aborted".to_string(),
            ))
        }
    }
}

/// Renders a router response as an HTTP response.
pub fn into_response(route: RouteResponse) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(route.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match &route.body {
        Some(value) => Bytes::from(value.to_string()),
        None => Bytes::new(),
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    if route.body.is_some() {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    if let Ok(value) = HeaderValue::from_str(&route.request_id.to_string()) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    if let Some(location) = route.location.as_deref() {
        if let Ok(value) = HeaderValue::from_str(location) {
            headers.insert(LOCATION, value);
        }
    }
    response
}

fn plain_error(status: StatusCode, kind: &str, message: String) -> Response<Full<Bytes>> {
    let body = json!({ "error": message, "kind": kind }).to_string();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
