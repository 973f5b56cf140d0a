use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json as AxumJson,
};
use serde::Deserialize;
use serde_json::Value;

use crate::render::guess_type;
use crate::resource::normalize;
use crate::web::state::AppState;
use crate::web::utils::errors::bad_request_json;

pub const DEFAULT_FALLBACK_TITLE: &str = "Resource";

#[derive(Deserialize)]
pub struct ResolveRequest {
    pub resource: Value,
    #[serde(default)]
    pub fallback_title: Option<String>,
}

/// 解析资源接口
///
/// 规范化资源引用并生成可渲染的 URL，同时返回推断的预览类型。
pub async fn handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResolveRequest>,
) -> Response {
    let fallback = payload
        .fallback_title
        .as_deref()
        .unwrap_or(DEFAULT_FALLBACK_TITLE);
    let Some(resource) = normalize(&payload.resource, fallback) else {
        return (
            StatusCode::BAD_REQUEST,
            AxumJson(bad_request_json("resource has no usable locator")),
        )
            .into_response();
    };
    let locator = resource.locator().unwrap_or_default();

    match state.resolver.resolve(locator).await {
        Ok(resolved) => {
            let preview = guess_type(
                &resolved.primary_embed,
                resource.mime.as_deref(),
                &state.hosts,
            );
            AxumJson(serde_json::json!({
                "status": "success",
                "resource": resource,
                "resolved": resolved,
                "preview": preview,
            }))
            .into_response()
        }
        Err(e) => {
            tracing::warn!("[Resolver] Resolve failed: {}", e);
            (
                StatusCode::BAD_REQUEST,
                AxumJson(bad_request_json(&e.to_string())),
            )
                .into_response()
        }
    }
}
