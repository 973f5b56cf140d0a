pub mod api;
pub mod state;
pub mod utils;

use axum::{
    http::{StatusCode, Uri},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::web::{
    api::{proxy, resolve, viewer, ws},
    state::AppState,
    utils::errors::not_found_json,
};

/// 路由定义
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/proxy", get(proxy::handler))
        .route("/api/resolve", post(resolve::handler))
        .route("/viewer/embed", get(viewer::embed_handler))
        .route("/ws/viewer", get(ws::ws_handler))
        .fallback(not_found)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

async fn not_found(uri: Uri) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(not_found_json(uri.path())))
}
