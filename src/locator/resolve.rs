use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::storage::signer::UrlSigner;

use super::classify::classify_url;
use super::hosts::HostTable;
use super::proxy::ProxyGateway;
use super::{absolute_url, HostCategory, ResolutionError, ResolvedLocator};

/// Turns a locator into a renderable URL, signing and proxy-wrapping as required.
pub struct LocatorResolver {
    hosts: Arc<HostTable>,
    signer: Arc<dyn UrlSigner>,
    proxy: ProxyGateway,
}

impl LocatorResolver {
    pub fn new(hosts: Arc<HostTable>, signer: Arc<dyn UrlSigner>, proxy: ProxyGateway) -> Self {
        Self {
            hosts,
            signer,
            proxy,
        }
    }

    pub fn hosts(&self) -> &Arc<HostTable> {
        &self.hosts
    }

    pub fn proxy(&self) -> &ProxyGateway {
        &self.proxy
    }

    /// Signing failures do not reject: the original locator is returned with
    /// `degraded` set. Only a blank locator is an error.
    pub async fn resolve(&self, locator: &str) -> Result<ResolvedLocator, ResolutionError> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(ResolutionError::EmptyLocator);
        }

        let Some(url) = absolute_url(locator) else {
            return Ok(self.resolve_path(locator).await);
        };

        let resolved = match classify_url(&url, &self.hosts) {
            HostCategory::DocumentHost => self.resolve_document(locator, &url),
            HostCategory::ObjectStorage if !self.hosts.has_access_token(&url) => {
                self.resolve_storage_url(locator, &url).await
            }
            category => self.passthrough(locator, &url, category),
        };
        Ok(resolved)
    }

    /// Strict re-sign used after an unauthorized preflight. No fall-through.
    pub async fn resign(&self, locator: &str) -> Result<String, ResolutionError> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(ResolutionError::EmptyLocator);
        }
        let signed = self.signer.sign(locator).await?;
        let wrap = match absolute_url(locator) {
            Some(url) => self.hosts.requires_proxy(&url),
            None => true,
        };
        debug!("[Resolver] Re-signed {}", locator);
        Ok(if wrap { self.proxy.wrap(&signed) } else { signed })
    }

    fn resolve_document(&self, locator: &str, url: &Url) -> ResolvedLocator {
        let (preview, download) = match self.hosts.embed_forms(url) {
            Some(forms) => (forms.preview, forms.download),
            None => (locator.to_string(), locator.to_string()),
        };
        ResolvedLocator {
            final_url: locator.to_string(),
            host_category: HostCategory::DocumentHost,
            is_proxied: false,
            primary_embed: preview,
            alternate_embed: Some(self.hosts.viewer_embed(&download)),
            degraded: None,
        }
    }

    async fn resolve_storage_url(&self, locator: &str, url: &Url) -> ResolvedLocator {
        match self.signer.sign(locator).await {
            Ok(signed) => {
                if self.hosts.requires_proxy(url) {
                    let wrapped = self.proxy.wrap(&signed);
                    ResolvedLocator::direct(wrapped, HostCategory::ObjectStorage, true)
                } else {
                    ResolvedLocator::direct(signed, HostCategory::ObjectStorage, false)
                }
            }
            Err(err) => {
                warn!("[Resolver] Signing {} failed, using original URL: {}", locator, err);
                ResolvedLocator::direct(locator.to_string(), HostCategory::ObjectStorage, false)
                    .with_degraded(err)
            }
        }
    }

    fn passthrough(&self, locator: &str, url: &Url, category: HostCategory) -> ResolvedLocator {
        if self.hosts.requires_proxy(url) {
            ResolvedLocator::direct(self.proxy.wrap(locator), category, true)
        } else {
            ResolvedLocator::direct(locator.to_string(), category, false)
        }
    }

    async fn resolve_path(&self, path: &str) -> ResolvedLocator {
        match self.signer.sign(path).await {
            Ok(signed) => {
                ResolvedLocator::direct(self.proxy.wrap(&signed), HostCategory::ObjectStorage, true)
            }
            Err(err) => {
                warn!("[Resolver] Signing path {} failed: {}", path, err);
                ResolvedLocator::direct(path.to_string(), HostCategory::ObjectStorage, false)
                    .with_degraded(err)
            }
        }
    }
}
