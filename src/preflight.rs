use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

/// Why a resolved URL failed its existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum PreflightError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("network error")]
    NetworkError,
}

impl PreflightError {
    pub fn from_status(status: StatusCode) -> Option<Self> {
        if status.is_success() {
            return None;
        }
        Some(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized,
            StatusCode::NOT_FOUND | StatusCode::GONE => Self::NotFound,
            _ => Self::NetworkError,
        })
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unauthorized => "You are not authorized to view this resource (unauthorized).",
            Self::NotFound => "The resource could not be found. It may have been moved or deleted.",
            Self::NetworkError => "The resource could not be loaded. Please try again later.",
        }
    }
}

/// Lightweight existence check run before trusting a proxied URL.
#[async_trait::async_trait]
pub trait Preflight: Send + Sync {
    async fn check(&self, url: &str) -> Result<(), PreflightError>;
}

/// Issues a HEAD request. The caller bounds the wait with its own timeout.
pub struct HttpPreflight {
    client: Client,
}

impl HttpPreflight {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Preflight for HttpPreflight {
    async fn check(&self, url: &str) -> Result<(), PreflightError> {
        let response = self.client.head(url).send().await.map_err(|err| {
            debug!("[Preflight] HEAD {} failed: {}", url, err);
            PreflightError::NetworkError
        })?;
        match PreflightError::from_status(response.status()) {
            Some(err) => {
                debug!("[Preflight] HEAD {} -> {}", url, response.status());
                Err(err)
            }
            None => Ok(()),
        }
    }
}
