//! Settings for the Azure OpenAI resource requests are forwarded to.
use axum::http::HeaderValue;
use bon::Builder;
use std::{fmt, time::Duration};
use url::Url;

use crate::errors::ProxyError;

pub const DEFAULT_API_VERSION: &str = "2025-01-01-preview";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// The static key sent in the `api-key` header. Never printed.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub(crate) fn header_value(&self) -> Result<HeaderValue, ProxyError> {
        let mut value = HeaderValue::from_str(&self.0)
            .map_err(|_| ProxyError::Internal("API key is not a valid header value".into()))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

#[derive(Debug, Clone, Builder)]
pub struct UpstreamConfig {
    /// Base URL of the resource, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: Url,
    pub api_key: ApiKey,
    #[builder(into, default = DEFAULT_API_VERSION.to_string())]
    pub api_version: String,
    /// Bounds the wait for response headers and, for non-streaming calls, the body.
    #[builder(default = DEFAULT_TIMEOUT)]
    pub timeout: Duration,
}

impl UpstreamConfig {
    /// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={version}`
    pub fn chat_completions_url(&self, deployment: &str) -> Result<Url, ProxyError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ProxyError::Internal(format!("Invalid endpoint: {}", self.endpoint)))?
            .pop_if_empty()
            .extend(["openai", "deployments", deployment, "chat", "completions"]);
        url.query_pairs_mut()
            .clear()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }
}
