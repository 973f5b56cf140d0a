use serde::Serialize;

use crate::locator::HostCategory;
use crate::render::PreviewKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Loading,
    Ready,
    Degraded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionMeta {
    /// The locator exactly as the resource supplied it.
    pub raw: String,
    pub host_category: HostCategory,
    pub primary_embed: Option<String>,
    pub alternate_embed: Option<String>,
    pub is_proxied: bool,
}

/// Snapshot of the single active preview. Absence of a session means closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewerSession {
    pub generation: u64,
    pub title: String,
    /// Active URL the renderer should paint; empty until resolution completes.
    pub url: String,
    pub mime: Option<String>,
    pub kind: Option<PreviewKind>,
    pub meta: SessionMeta,
    pub status: SessionStatus,
    /// Loading indicator; cleared by the renderer load event or the safety timer.
    pub loading: bool,
    /// Bumped every time `url` changes. Renderer events for an older embed are ignored.
    pub revision: u32,
    pub error_message: Option<String>,
}

impl ViewerSession {
    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Ready | SessionStatus::Degraded | SessionStatus::Failed
        )
    }
}
