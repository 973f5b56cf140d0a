use maud::{html, Markup};
use serde::{Deserialize, Serialize};
use url::{form_urlencoded, Url};

use crate::locator::{absolute_url, HostTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    Pdf,
    Image,
    Video,
    Audio,
    Iframe,
    Unknown,
}

impl PreviewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Iframe => "iframe",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum RenderError {
    #[error("this resource type cannot be previewed")]
    UnsupportedType,
    #[error("the preview failed to load")]
    LoadFailed,
}

const PDF_EXTENSIONS: &[&str] = &["pdf"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "avif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "m4v", "ogv", "mkv"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "oga", "m4a", "aac", "flac", "opus"];

/// MIME hint first, then document hosts, then file extension of the URL or of a
/// URL carried in its query (proxy and viewer wrappers).
pub fn guess_type(url: &str, mime: Option<&str>, hosts: &HostTable) -> PreviewKind {
    if let Some(kind) = mime.and_then(kind_from_mime) {
        return kind;
    }
    if absolute_url(url).is_some_and(|parsed| hosts.is_document_host(&parsed)) {
        return PreviewKind::Iframe;
    }

    let (path, query) = split_locator(url);
    if let Some(kind) = kind_from_extension(path) {
        return kind;
    }
    if let Some(query) = query {
        for (_, value) in form_urlencoded::parse(query.as_bytes()) {
            if let Some(kind) = kind_from_extension(split_locator(&value).0) {
                return kind;
            }
        }
    }
    PreviewKind::Unknown
}

fn kind_from_mime(mime: &str) -> Option<PreviewKind> {
    let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if essence == "application/pdf" {
        Some(PreviewKind::Pdf)
    } else if essence.starts_with("image/") {
        Some(PreviewKind::Image)
    } else if essence.starts_with("video/") {
        Some(PreviewKind::Video)
    } else if essence.starts_with("audio/") {
        Some(PreviewKind::Audio)
    } else {
        None
    }
}

fn kind_from_extension(path: &str) -> Option<PreviewKind> {
    let segment = path.rsplit('/').next().unwrap_or("");
    let (_, ext) = segment.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    let ext = ext.as_str();
    if PDF_EXTENSIONS.contains(&ext) {
        Some(PreviewKind::Pdf)
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        Some(PreviewKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some(PreviewKind::Video)
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        Some(PreviewKind::Audio)
    } else {
        None
    }
}

fn split_locator(url: &str) -> (&str, Option<&str>) {
    let without_fragment = url.split('#').next().unwrap_or("");
    match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderPlan {
    pub kind: PreviewKind,
    pub src: String,
    pub open_in_new_tab: bool,
}

/// Picks the embed strategy for a resolved URL. Only http(s) and relative
/// URLs are rendered.
pub fn plan(url: &str, mime: Option<&str>, hosts: &HostTable) -> Result<RenderPlan, RenderError> {
    let src = url.trim();
    if src.is_empty() {
        return Err(RenderError::UnsupportedType);
    }
    if Url::parse(src).is_ok() && absolute_url(src).is_none() {
        return Err(RenderError::UnsupportedType);
    }
    let kind = guess_type(src, mime, hosts);
    Ok(RenderPlan {
        kind,
        src: src.to_string(),
        open_in_new_tab: kind == PreviewKind::Unknown,
    })
}

/// Embed markup. Each element reports back through
/// `viewerSignal(event, generation, revision)`.
pub fn render_embed(plan: &RenderPlan, title: &str, generation: u64, revision: u32) -> Markup {
    let loaded = format!("viewerSignal('loaded', {generation}, {revision})");
    let failed = format!("viewerSignal('failed', {generation}, {revision})");

    html! {
        div class="viewer-embed" data-kind=(plan.kind.as_str()) data-generation=(generation) data-revision=(revision) {
            @match plan.kind {
                PreviewKind::Image => {
                    img src=(plan.src) alt=(title) onload=(loaded) onerror=(failed);
                }
                PreviewKind::Video => {
                    video src=(plan.src) controls preload="metadata" onloadeddata=(loaded) onerror=(failed) {}
                }
                PreviewKind::Audio => {
                    audio src=(plan.src) controls preload="metadata" onloadeddata=(loaded) onerror=(failed) {}
                }
                PreviewKind::Pdf | PreviewKind::Iframe | PreviewKind::Unknown => {
                    iframe src=(plan.src) title=(title) allow="fullscreen" onload=(loaded) onerror=(failed) {}
                }
            }
            @if plan.open_in_new_tab {
                a class="viewer-open-original" href=(plan.src) target="_blank" rel="noopener noreferrer" {
                    "Open in new tab"
                }
            }
        }
    }
}
