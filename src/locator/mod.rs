pub mod classify;
pub mod hosts;
pub mod proxy;
pub mod resolve;


use serde::Serialize;
use url::Url;

pub use classify::{classify, classify_url};
pub use hosts::HostTable;
pub use proxy::ProxyGateway;
pub use resolve::LocatorResolver;

/// Which trust boundary a locator belongs to. Decided once per locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostCategory {
    ObjectStorage,
    DocumentHost,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ResolutionError {
    #[error("empty locator")]
    EmptyLocator,
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("access denied: {0}")]
    PermissionDenied(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Outcome of resolving one locator. Computed fresh on every open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLocator {
    pub final_url: String,
    pub host_category: HostCategory,
    pub is_proxied: bool,
    pub primary_embed: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_embed: Option<String>,
    /// Set when signing failed and the original locator was used instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<ResolutionError>,
}

impl ResolvedLocator {
    pub(crate) fn direct(final_url: String, host_category: HostCategory, is_proxied: bool) -> Self {
        Self {
            primary_embed: final_url.clone(),
            final_url,
            host_category,
            is_proxied,
            alternate_embed: None,
            degraded: None,
        }
    }

    pub(crate) fn with_degraded(mut self, error: ResolutionError) -> Self {
        self.degraded = Some(error);
        self
    }
}

/// Parses `locator` as an absolute http(s) URL. Anything else is a storage path.
pub fn absolute_url(locator: &str) -> Option<Url> {
    let url = Url::parse(locator.trim()).ok()?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Some(url),
        _ => None,
    }
}
