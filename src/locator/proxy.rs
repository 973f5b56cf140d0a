use url::form_urlencoded;

use crate::config::ProxySettings;

/// Builds and unpacks proxy gateway URLs of the form `{endpoint}?{param}={encoded target}`.
#[derive(Debug, Clone)]
pub struct ProxyGateway {
    endpoint: String,
    param: String,
}

impl ProxyGateway {
    pub fn new(endpoint: impl Into<String>, param: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            param: param.into(),
        }
    }

    pub fn from_settings(settings: &ProxySettings) -> Self {
        Self::new(settings.endpoint.clone(), settings.query_param.clone())
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    pub fn wrap(&self, target: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(target.as_bytes()).collect();
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}{}={}", self.endpoint, separator, self.param, encoded)
    }

    pub fn is_wrapped(&self, url: &str) -> bool {
        self.target(url).is_some()
    }

    /// The upstream URL carried by a wrapped proxy URL.
    pub fn target(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(&self.endpoint)?;
        let query = rest
            .strip_prefix('?')
            .or_else(|| rest.strip_prefix('&'))?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == self.param.as_str())
            .map(|(_, value)| value.into_owned())
    }
}
