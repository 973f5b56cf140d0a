use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::ObjectStore;
use percent_encoding::percent_decode_str;
use reqwest::Method;
use tracing::debug;

use crate::config::StorageSettings;
use crate::locator::{absolute_url, ResolutionError};

/// Object-storage signing collaborator.
#[async_trait::async_trait]
pub trait UrlSigner: Send + Sync {
    /// Returns a time-limited, token-bearing URL for a storage path or storage URL.
    async fn sign(&self, locator: &str) -> Result<String, ResolutionError>;
}

/// Presigns GET URLs against an S3-compatible bucket.
pub struct ObjectStoreSigner {
    store: Arc<AmazonS3>,
    bucket: String,
    public_prefixes: Vec<String>,
    expires_in: Duration,
    verify_exists: bool,
}

impl ObjectStoreSigner {
    pub fn from_settings(settings: &StorageSettings) -> anyhow::Result<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(settings.bucket.clone());
        if let Some(region) = &settings.region {
            builder = builder.with_region(region.clone());
        }
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.with_endpoint(endpoint.clone());
        }
        let store = builder.build().context("Failed to create S3 store")?;

        Ok(Self {
            store: Arc::new(store),
            bucket: settings.bucket.clone(),
            public_prefixes: settings.public_prefixes.clone(),
            expires_in: Duration::from_secs(settings.sign_ttl_secs),
            verify_exists: settings.verify_exists,
        })
    }

    /// Recovers the object key from a storage path or a storage URL.
    pub fn object_key(&self, locator: &str) -> Result<ObjectPath, ResolutionError> {
        let raw_key = match absolute_url(locator) {
            Some(url) => {
                let from_prefix = self
                    .public_prefixes
                    .iter()
                    .find_map(|prefix| locator.strip_prefix(prefix.as_str()))
                    .map(|rest| {
                        rest.split(|c: char| c == '?' || c == '#')
                            .next()
                            .unwrap_or("")
                            .to_string()
                    });
                from_prefix.unwrap_or_else(|| url.path().to_string())
            }
            None => locator.to_string(),
        };
        key_from_raw(&raw_key, &self.bucket)
            .ok_or_else(|| ResolutionError::NotFound(locator.to_string()))
    }
}

fn key_from_raw(raw: &str, bucket: &str) -> Option<ObjectPath> {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    let trimmed = decoded.trim().trim_start_matches('/');
    let without_bucket = trimmed
        .strip_prefix(bucket)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(trimmed);
    if without_bucket.is_empty() {
        return None;
    }
    ObjectPath::parse(without_bucket).ok()
}

fn map_store_error(locator: &str, err: object_store::Error) -> ResolutionError {
    match err {
        object_store::Error::NotFound { .. } => ResolutionError::NotFound(locator.to_string()),
        object_store::Error::PermissionDenied { .. }
        | object_store::Error::Unauthenticated { .. } => {
            ResolutionError::PermissionDenied(locator.to_string())
        }
        other => ResolutionError::Signing(other.to_string()),
    }
}

#[async_trait::async_trait]
impl UrlSigner for ObjectStoreSigner {
    async fn sign(&self, locator: &str) -> Result<String, ResolutionError> {
        let key = self.object_key(locator)?;
        if self.verify_exists {
            self.store
                .head(&key)
                .await
                .map_err(|err| map_store_error(locator, err))?;
        }
        let url = self
            .store
            .signed_url(Method::GET, &key, self.expires_in)
            .await
            .map_err(|err| map_store_error(locator, err))?;
        debug!("[Signer] Signed {} (expires in {:?})", key, self.expires_in);
        Ok(url.to_string())
    }
}
