use url::Url;

use super::hosts::HostTable;
use super::{absolute_url, HostCategory};

/// Storage paths (anything that is not an absolute http(s) URL) are object storage.
pub fn classify(locator: &str, hosts: &HostTable) -> HostCategory {
    match absolute_url(locator) {
        Some(url) => classify_url(&url, hosts),
        None => HostCategory::ObjectStorage,
    }
}

pub fn classify_url(url: &Url, hosts: &HostTable) -> HostCategory {
    if hosts.is_document_host(url) {
        HostCategory::DocumentHost
    } else if hosts.is_storage_host(url) {
        HostCategory::ObjectStorage
    } else {
        HostCategory::Other
    }
}
