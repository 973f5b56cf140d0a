use config::{Config, Environment, File};
use serde::Deserialize;

use crate::locator::hosts::{default_document_hosts, DocumentHostConfig};

/// 应用配置总结构
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub proxy: ProxySettings,
    pub hosts: HostSettings,
    pub viewer: ViewerSettings,
}

/// 服务相关配置（监听地址、端口）
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// 对象存储配置（签名所用的 S3 兼容存储）
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    /// 自定义 S3 兼容端点（MinIO / R2 等），为空时使用 AWS 默认端点
    #[serde(default)]
    pub endpoint: Option<String>,
    /// 对象的公开访问前缀，用于从绝对 URL 中还原对象 key
    #[serde(default)]
    pub public_prefixes: Vec<String>,
    /// 签名 URL 有效期（单位：秒）
    pub sign_ttl_secs: u64,
    /// 签名前是否先检查对象存在
    pub verify_exists: bool,
}

/// 代理网关配置
#[derive(Debug, Deserialize, Clone)]
pub struct ProxySettings {
    /// 代理网关对外的绝对地址，解析结果会包装成 `{endpoint}?{query_param}=...`
    pub endpoint: String,
    pub query_param: String,
    /// 允许代理的上游主机（精确匹配或后缀匹配）
    #[serde(default = "default_proxy_hosts")]
    pub allowed_hosts: Vec<String>,
    /// 上游请求超时（单位：秒）
    pub timeout_secs: u64,
}

/// 主机分类数据表
#[derive(Debug, Deserialize, Clone)]
pub struct HostSettings {
    #[serde(default = "default_storage_hosts")]
    pub storage_hosts: Vec<String>,
    /// 表示 URL 已携带访问令牌的查询参数名
    #[serde(default = "default_token_params")]
    pub token_params: Vec<String>,
    /// 通用第三方文档查看器，备用嵌入通过它包装直链
    pub document_viewer: String,
    #[serde(default = "default_document_hosts")]
    pub document_hosts: Vec<DocumentHostConfig>,
}

/// 文档托管链接的打开方式
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentHostMode {
    /// 在预览弹窗中嵌入
    Embed,
    /// 直接在新标签页打开，不显示弹窗
    Link,
}

/// 预览会话的时间约束
#[derive(Debug, Deserialize, Clone)]
pub struct ViewerSettings {
    pub document_host_mode: DocumentHostMode,
    pub safety_timeout_ms: u64,
    pub preflight_timeout_ms: u64,
    pub alternate_timeout_ms: u64,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            document_host_mode: DocumentHostMode::Embed,
            safety_timeout_ms: 7500,
            preflight_timeout_ms: 7000,
            alternate_timeout_ms: 2500,
        }
    }
}

pub(crate) fn default_storage_hosts() -> Vec<String> {
    vec![
        "amazonaws.com".to_string(),
        "r2.cloudflarestorage.com".to_string(),
        "supabase.co".to_string(),
    ]
}

pub(crate) fn default_proxy_hosts() -> Vec<String> {
    default_storage_hosts()
}

pub(crate) fn default_token_params() -> Vec<String> {
    vec![
        "token".to_string(),
        "X-Amz-Signature".to_string(),
        "Signature".to_string(),
        "sig".to_string(),
    ]
}

impl Settings {
    /// 加载配置：支持默认值、可选配置文件、环境变量覆盖
    pub fn new() -> anyhow::Result<Self> {
        let viewer = ViewerSettings::default();
        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("storage.bucket", "portal-resources")?
            .set_default("storage.sign_ttl_secs", 3600)?
            .set_default("storage.verify_exists", true)?
            .set_default("proxy.endpoint", "http://127.0.0.1:3000/proxy")?
            .set_default("proxy.query_param", "url")?
            .set_default("proxy.timeout_secs", 30)?
            .set_default(
                "hosts.document_viewer",
                "https://docs.google.com/viewer?embedded=true",
            )?
            .set_default("viewer.document_host_mode", "embed")?
            .set_default("viewer.safety_timeout_ms", viewer.safety_timeout_ms)?
            .set_default("viewer.preflight_timeout_ms", viewer.preflight_timeout_ms)?
            .set_default("viewer.alternate_timeout_ms", viewer.alternate_timeout_ms)?
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("PORTAL").separator("__"));

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}
