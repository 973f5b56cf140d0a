use std::sync::Arc;

use axum::extract::{
    ws::{Message, WebSocket, WebSocketUpgrade},
    State,
};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::render::RenderError;
use crate::resource::normalize;
use crate::viewer::{spawn_viewer, ViewerHandle, ViewerSession};
use crate::web::state::AppState;

use super::resolve::DEFAULT_FALLBACK_TITLE;

/// Messages the page sends to its viewer.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Open {
        resource: Value,
        #[serde(default)]
        fallback_title: Option<String>,
    },
    Close,
    TryAlternate,
    OpenOriginal,
    Loaded {
        generation: u64,
        revision: u32,
    },
    Failed {
        generation: u64,
        revision: u32,
        #[serde(default)]
        reason: Option<RenderError>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Session { session: Option<ViewerSession> },
    Navigate { url: String },
    Error { message: String },
}

/// 预览会话 WebSocket：每个连接持有一个独立的预览会话
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let client_id = format!("viewer-{}", Uuid::new_v4());
    let (viewer, mut navigations) = spawn_viewer(
        state.resolver.clone(),
        state.preflight.clone(),
        state.settings.viewer.clone(),
    );
    let mut sessions = viewer.subscribe();
    tracing::debug!("[WebSocket] {} connected", client_id);

    loop {
        let outgoing = tokio::select! {
            changed = sessions.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = sessions.borrow_and_update().clone();
                ServerMessage::Session { session }
            }
            url = navigations.recv() => {
                let Some(url) = url else {
                    break;
                };
                ServerMessage::Navigate { url }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match dispatch(&viewer, &text).await {
                            Ok(()) => continue,
                            Err(err) => {
                                tracing::warn!("[WebSocket] {} bad message: {}", client_id, err);
                                ServerMessage::Error { message: err.to_string() }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
        };

        match serde_json::to_string(&outgoing) {
            Ok(text) => {
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::warn!("[WebSocket] Failed to serialize message: {}", err);
            }
        }
    }

    if let Err(err) = viewer.close().await {
        tracing::debug!("[WebSocket] {} viewer already stopped: {}", client_id, err);
    }
    tracing::debug!("[WebSocket] {} disconnected", client_id);
}

async fn dispatch(viewer: &ViewerHandle, text: &str) -> anyhow::Result<()> {
    let message: ClientMessage = serde_json::from_str(text)?;
    match message {
        ClientMessage::Open {
            resource,
            fallback_title,
        } => {
            let fallback = fallback_title.as_deref().unwrap_or(DEFAULT_FALLBACK_TITLE);
            let resource = normalize(&resource, fallback)
                .ok_or_else(|| anyhow::anyhow!("resource has no usable locator"))?;
            viewer.open(resource).await
        }
        ClientMessage::Close => viewer.close().await,
        ClientMessage::TryAlternate => viewer.try_alternate().await,
        ClientMessage::OpenOriginal => viewer.open_original().await,
        ClientMessage::Loaded {
            generation,
            revision,
        } => viewer.frame_loaded(generation, revision).await,
        ClientMessage::Failed {
            generation,
            revision,
            reason,
        } => {
            viewer
                .frame_failed(
                    generation,
                    revision,
                    reason.unwrap_or(RenderError::LoadFailed),
                )
                .await
        }
    }
}
