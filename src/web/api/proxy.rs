use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use reqwest::redirect::Policy;
use tracing::{error, warn};

use crate::locator::{absolute_url, HostTable};
use crate::web::state::AppState;
use crate::web::utils::errors::{
    bad_request_json, internal_error_json, proxy_bad_gateway_json, proxy_forbidden_json,
};
use crate::web::utils::mime::content_type_for_path;

const HEAD_CHECK_RANGE: &str = "bytes=0-0";

const FORWARDED_HEADERS: [HeaderName; 6] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::ACCEPT_RANGES,
    header::CONTENT_RANGE,
    header::ETAG,
    header::LAST_MODIFIED,
];

/// 代理网关：转发白名单主机上的对象
///
/// 上游状态码（包括 401/403）与 content-type 原样返回，响应体以流方式传输。
/// HEAD 请求以 `Range: bytes=0-0` 的 GET 访问上游（200 或 206 均表示可用），不返回响应体。
pub async fn handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let param = state.resolver.proxy().param();
    let Some(target) = params.get(param) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(bad_request_json(&format!("missing `{}` parameter", param))),
        )
            .into_response();
    };
    if state.resolver.proxy().is_wrapped(target) {
        return (
            StatusCode::BAD_REQUEST,
            Json(bad_request_json("target is already a proxy URL")),
        )
            .into_response();
    }
    let Some(url) = absolute_url(target) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(bad_request_json("target must be an absolute http(s) URL")),
        )
            .into_response();
    };
    if !state.hosts.requires_proxy(&url) {
        let host = url.host_str().unwrap_or("").to_string();
        warn!("[Proxy] Rejected host: {}", host);
        return (StatusCode::FORBIDDEN, Json(proxy_forbidden_json(&host))).into_response();
    }

    // Presigned URLs are bound to GET, so a HEAD is answered with a one-byte ranged GET
    let head_only = method == Method::HEAD;
    let mut request = state.http.get(url.clone());
    if head_only {
        request = request.header(header::RANGE, HEAD_CHECK_RANGE);
    } else if let Some(range) = headers.get(header::RANGE) {
        request = request.header(header::RANGE, range.clone());
    }

    let upstream = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            error!("[Proxy] Upstream request failed: {}", e);
            return (
                StatusCode::BAD_GATEWAY,
                Json(proxy_bad_gateway_json(&e.to_string())),
            )
                .into_response();
        }
    };

    // an empty object cannot satisfy the one-byte range but still exists
    let status = match upstream.status() {
        StatusCode::RANGE_NOT_SATISFIABLE if head_only => StatusCode::OK,
        status => status,
    };
    let mut builder = Response::builder().status(status);
    for name in FORWARDED_HEADERS {
        if head_only && (name == header::CONTENT_LENGTH || name == header::CONTENT_RANGE) {
            continue;
        }
        if let Some(value) = upstream.headers().get(&name) {
            builder = builder.header(name, value.clone());
        }
    }
    if !upstream.headers().contains_key(header::CONTENT_TYPE) {
        builder = builder.header(header::CONTENT_TYPE, content_type_for_path(url.path()));
    }

    let body = if head_only {
        Body::empty()
    } else {
        Body::from_stream(upstream.bytes_stream())
    };
    match builder.body(body) {
        Ok(response) => response,
        Err(e) => {
            error!("[Proxy] Response build failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(internal_error_json(&e.to_string())),
            )
                .into_response()
        }
    }
}

/// 仅跟随指向白名单主机的重定向
pub fn build_redirect_policy(hosts: Arc<HostTable>) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= 5 {
            return attempt.stop();
        }
        let allowed = absolute_url(attempt.url().as_str())
            .map(|url| hosts.requires_proxy(&url))
            .unwrap_or(false);
        if allowed {
            attempt.follow()
        } else {
            attempt.stop()
        }
    })
}
