use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::config::Settings;
use crate::locator::{HostTable, LocatorResolver, ProxyGateway};
use crate::preflight::{HttpPreflight, Preflight};
use crate::storage::{ObjectStoreSigner, UrlSigner};
use crate::web::api::proxy::build_redirect_policy;

/// Web 应用全局状态
///
/// 职责：包含所有跨请求共享的对象（主机表、解析器、上游 HTTP 客户端），通过 Arc 注入到 Axum 的 Handler 中。
pub struct AppState {
    pub settings: Settings,
    pub hosts: Arc<HostTable>,
    pub resolver: Arc<LocatorResolver>,
    pub preflight: Arc<dyn Preflight>,
    pub http: reqwest::Client,
}

impl AppState {
    /// 使用指定的签名器与预检实现构造状态（测试中可注入替身）
    pub fn new(
        settings: Settings,
        signer: Arc<dyn UrlSigner>,
        preflight: Arc<dyn Preflight>,
    ) -> anyhow::Result<Self> {
        let hosts = Arc::new(HostTable::from_settings(&settings)?);
        let proxy = ProxyGateway::from_settings(&settings.proxy);
        let resolver = Arc::new(LocatorResolver::new(hosts.clone(), signer, proxy));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.proxy.timeout_secs))
            .redirect(build_redirect_policy(hosts.clone()))
            .build()
            .context("HTTP client init failed")?;

        Ok(Self {
            settings,
            hosts,
            resolver,
            preflight,
            http,
        })
    }

    /// 生产环境：S3 签名 + HEAD 预检
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let signer = Arc::new(ObjectStoreSigner::from_settings(&settings.storage)?);
        let preflight_client = reqwest::Client::builder()
            .build()
            .context("Preflight client init failed")?;
        let preflight = Arc::new(HttpPreflight::new(preflight_client));
        Self::new(settings, signer, preflight)
    }
}
