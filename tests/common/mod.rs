#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portal_viewer::config::Settings;
use portal_viewer::locator::{HostTable, LocatorResolver, ProxyGateway, ResolutionError};
use portal_viewer::preflight::{Preflight, PreflightError};
use portal_viewer::storage::UrlSigner;

pub const PROXY_ENDPOINT: &str = "http://127.0.0.1:3000/proxy";

/// Signs `locator` into a fake S3 URL, or replays scripted outcomes.
pub struct FakeSigner {
    calls: AtomicUsize,
    script: Mutex<VecDeque<(Duration, Result<String, ResolutionError>)>>,
    fail_when_exhausted: bool,
}

impl FakeSigner {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            fail_when_exhausted: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            fail_when_exhausted: true,
        })
    }

    /// Replays outcomes in order; `None` entries mean "sign normally".
    pub fn scripted(
        steps: Vec<(Duration, Option<ResolutionError>)>,
        fail_when_exhausted: bool,
    ) -> Arc<Self> {
        let script = steps
            .into_iter()
            .map(|(delay, err)| (delay, err.map_or(Ok(String::new()), Err)))
            .collect();
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(script),
            fail_when_exhausted,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn signed_url_for(locator: &str, n: usize) -> String {
    let key = locator
        .trim_start_matches("https://")
        .split_once('/')
        .map(|(_, key)| key)
        .unwrap_or(locator);
    let key = key.split('?').next().unwrap_or(key);
    format!(
        "https://portal-resources.s3.amazonaws.com/{}?X-Amz-Signature=sig{}",
        key, n
    )
}

#[async_trait::async_trait]
impl UrlSigner for FakeSigner {
    async fn sign(&self, locator: &str) -> Result<String, ResolutionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some((delay, outcome)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                outcome.map(|_| signed_url_for(locator, n))
            }
            None if self.fail_when_exhausted => {
                Err(ResolutionError::NotFound(locator.to_string()))
            }
            None => Ok(signed_url_for(locator, n)),
        }
    }
}

/// Replays scripted preflight results, then answers OK.
pub struct FakePreflight {
    calls: AtomicUsize,
    script: Mutex<VecDeque<Result<(), PreflightError>>>,
}

impl FakePreflight {
    pub fn ok() -> Arc<Self> {
        Self::scripted(Vec::new())
    }

    pub fn scripted(results: Vec<Result<(), PreflightError>>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(results.into_iter().collect()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Preflight for FakePreflight {
    async fn check(&self, _url: &str) -> Result<(), PreflightError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

pub fn hosts() -> Arc<HostTable> {
    Arc::new(HostTable::default())
}

pub fn resolver(signer: Arc<FakeSigner>) -> Arc<LocatorResolver> {
    Arc::new(LocatorResolver::new(
        hosts(),
        signer,
        ProxyGateway::new(PROXY_ENDPOINT, "url"),
    ))
}

pub fn settings() -> Settings {
    let mut settings = Settings::new().expect("settings");
    settings.proxy.endpoint = PROXY_ENDPOINT.to_string();
    settings
}
