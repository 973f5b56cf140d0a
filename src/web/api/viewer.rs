use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use maud::html;
use serde::Deserialize;

use crate::render::{plan, render_embed};
use crate::web::state::AppState;

use super::resolve::DEFAULT_FALLBACK_TITLE;

#[derive(Deserialize)]
pub struct EmbedQuery {
    pub url: String,
    pub mime: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub revision: u32,
}

/// 预览嵌入片段
///
/// 根据 URL 与 MIME 提示选择嵌入方式，返回 HTML 片段。
pub async fn embed_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmbedQuery>,
) -> Response {
    let title = query.title.as_deref().unwrap_or(DEFAULT_FALLBACK_TITLE);
    match plan(&query.url, query.mime.as_deref(), &state.hosts) {
        Ok(plan) => render_embed(&plan, title, query.generation, query.revision).into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            html! {
                div class="viewer-error" data-generation=(query.generation) {
                    p { (e) }
                }
            },
        )
            .into_response(),
    }
}
