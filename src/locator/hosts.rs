use anyhow::Context;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::config::{default_proxy_hosts, default_storage_hosts, default_token_params, Settings};

const DEFAULT_DOCUMENT_VIEWER: &str = "https://docs.google.com/viewer?embedded=true";

/// One document-hosting family as it appears in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentHostConfig {
    pub family: String,
    pub hosts: Vec<String>,
    #[serde(default)]
    pub transforms: Vec<EmbedTransformConfig>,
}

/// `pattern` is matched against `path[?query]`; templates expand `${name}` captures.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbedTransformConfig {
    pub pattern: String,
    pub preview: String,
    pub download: String,
}

pub fn default_document_hosts() -> Vec<DocumentHostConfig> {
    let transform = |pattern: &str, preview: &str, download: &str| EmbedTransformConfig {
        pattern: pattern.to_string(),
        preview: preview.to_string(),
        download: download.to_string(),
    };

    vec![
        DocumentHostConfig {
            family: "google-drive".to_string(),
            hosts: vec!["drive.google.com".to_string()],
            transforms: vec![
                transform(
                    r"^/file/d/(?P<id>[^/?#]+)",
                    "https://drive.google.com/file/d/${id}/preview",
                    "https://drive.google.com/uc?export=download&id=${id}",
                ),
                transform(
                    r"^/(?:open|uc)\?(?:.*&)?id=(?P<id>[^&#]+)",
                    "https://drive.google.com/file/d/${id}/preview",
                    "https://drive.google.com/uc?export=download&id=${id}",
                ),
            ],
        },
        DocumentHostConfig {
            family: "google-docs".to_string(),
            hosts: vec!["docs.google.com".to_string()],
            transforms: vec![
                transform(
                    r"^/document/d/(?P<id>[^/?#]+)",
                    "https://docs.google.com/document/d/${id}/preview",
                    "https://docs.google.com/document/d/${id}/export?format=pdf",
                ),
                transform(
                    r"^/presentation/d/(?P<id>[^/?#]+)",
                    "https://docs.google.com/presentation/d/${id}/embed",
                    "https://docs.google.com/presentation/d/${id}/export/pdf",
                ),
                transform(
                    r"^/spreadsheets/d/(?P<id>[^/?#]+)",
                    "https://docs.google.com/spreadsheets/d/${id}/preview",
                    "https://docs.google.com/spreadsheets/d/${id}/export?format=pdf",
                ),
            ],
        },
    ]
}

#[derive(Debug, Clone)]
struct DocumentHostRule {
    family: String,
    hosts: Vec<String>,
    transforms: Vec<EmbedTransform>,
}

#[derive(Debug, Clone)]
struct EmbedTransform {
    pattern: Regex,
    preview: String,
    download: String,
}

/// Embeddable forms of a document-host link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedForms {
    pub family: String,
    pub preview: String,
    pub download: String,
}

/// Host allow-lists and document-host pattern table.
#[derive(Debug, Clone)]
pub struct HostTable {
    document_hosts: Vec<DocumentHostRule>,
    storage_hosts: Vec<String>,
    proxy_hosts: Vec<String>,
    token_params: Vec<String>,
    document_viewer: Url,
}

impl Default for HostTable {
    fn default() -> Self {
        Self::build(
            &default_document_hosts(),
            default_storage_hosts(),
            default_proxy_hosts(),
            default_token_params(),
            DEFAULT_DOCUMENT_VIEWER,
        )
        .expect("built-in host table is valid")
    }
}

impl HostTable {
    /// A custom storage endpoint signs URLs on its own host, so that host is
    /// both a storage host and proxy-allowed.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let hosts = &settings.hosts;
        let mut storage_hosts = hosts.storage_hosts.clone();
        let mut proxy_hosts = settings.proxy.allowed_hosts.clone();
        if let Some(endpoint) = &settings.storage.endpoint {
            let url = Url::parse(endpoint)
                .with_context(|| format!("Invalid storage endpoint: {}", endpoint))?;
            let host = url
                .host_str()
                .with_context(|| format!("Storage endpoint has no host: {}", endpoint))?;
            storage_hosts.push(host.to_string());
            proxy_hosts.push(host.to_string());
        }

        Self::build(
            &hosts.document_hosts,
            storage_hosts,
            proxy_hosts,
            hosts.token_params.clone(),
            &hosts.document_viewer,
        )
    }

    pub fn build(
        document_hosts: &[DocumentHostConfig],
        storage_hosts: Vec<String>,
        proxy_hosts: Vec<String>,
        token_params: Vec<String>,
        document_viewer: &str,
    ) -> anyhow::Result<Self> {
        let mut rules = Vec::with_capacity(document_hosts.len());
        for entry in document_hosts {
            let mut transforms = Vec::with_capacity(entry.transforms.len());
            for transform in &entry.transforms {
                let pattern = Regex::new(&transform.pattern).with_context(|| {
                    format!("Invalid embed pattern for {}: {}", entry.family, transform.pattern)
                })?;
                transforms.push(EmbedTransform {
                    pattern,
                    preview: transform.preview.clone(),
                    download: transform.download.clone(),
                });
            }
            rules.push(DocumentHostRule {
                family: entry.family.clone(),
                hosts: lowercase_all(&entry.hosts),
                transforms,
            });
        }

        let document_viewer = Url::parse(document_viewer).context("Invalid document viewer URL")?;

        Ok(Self {
            document_hosts: rules,
            storage_hosts: lowercase_all(&storage_hosts),
            proxy_hosts: lowercase_all(&proxy_hosts),
            token_params,
            document_viewer,
        })
    }

    pub fn is_document_host(&self, url: &Url) -> bool {
        self.document_rule(url).is_some()
    }

    pub fn is_storage_host(&self, url: &Url) -> bool {
        url_host_in(url, &self.storage_hosts)
    }

    /// Document hosts are never proxied even if an allow-list entry overlaps.
    pub fn requires_proxy(&self, url: &Url) -> bool {
        !self.is_document_host(url) && url_host_in(url, &self.proxy_hosts)
    }

    pub fn has_access_token(&self, url: &Url) -> bool {
        url.query_pairs().any(|(key, _)| {
            self.token_params
                .iter()
                .any(|param| param.eq_ignore_ascii_case(&key))
        })
    }

    /// Preview and direct-download forms for a document-host link. A link that
    /// matches no transform is used as-is for both forms.
    pub fn embed_forms(&self, url: &Url) -> Option<EmbedForms> {
        let rule = self.document_rule(url)?;
        let target = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        for transform in &rule.transforms {
            if let Some(caps) = transform.pattern.captures(&target) {
                let mut preview = String::new();
                caps.expand(&transform.preview, &mut preview);
                let mut download = String::new();
                caps.expand(&transform.download, &mut download);
                return Some(EmbedForms {
                    family: rule.family.clone(),
                    preview,
                    download,
                });
            }
        }

        Some(EmbedForms {
            family: rule.family.clone(),
            preview: url.to_string(),
            download: url.to_string(),
        })
    }

    /// Wraps a direct-download URL through the generic document viewer.
    pub fn viewer_embed(&self, download: &str) -> String {
        let mut viewer = self.document_viewer.clone();
        viewer.query_pairs_mut().append_pair("url", download);
        viewer.to_string()
    }

    fn document_rule(&self, url: &Url) -> Option<&DocumentHostRule> {
        self.document_hosts
            .iter()
            .find(|rule| url_host_in(url, &rule.hosts))
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}

fn url_host_in(url: &Url, entries: &[String]) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    entries.iter().any(|entry| host_matches(&host, entry))
}

pub(crate) fn host_matches(host: &str, entry: &str) -> bool {
    host == entry
        || host
            .strip_suffix(entry)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
