//! Configuration parsing and validation for the proxy server
//!
//! Every option can be given as a command-line flag or through its environment variable.
use anyhow::anyhow;
use azure_relay::upstream::{ApiKey, DEFAULT_API_VERSION, UpstreamConfig};
use clap::Parser;
use std::{path::PathBuf, time::Duration};
use url::Url;

#[derive(Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The port on which the proxy server will listen.
    #[arg(short = 'p', long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Base URL of the Azure OpenAI resource, e.g. https://my-resource.openai.azure.com
    #[arg(long, env = "AZURE_ENDPOINT")]
    pub endpoint: Url,

    /// Key sent to Azure in the api-key header.
    #[arg(long, env = "AZURE_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Azure OpenAI API version.
    #[arg(long, env = "AZURE_API_VERSION", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    /// JSON file mapping model names to deployments. Uses the built-in table when omitted.
    #[arg(short = 'f', long, env = "AZURE_DEPLOYMENTS_FILE")]
    pub deployments: Option<PathBuf>,

    /// Upper bound, in seconds, on waiting for Azure to respond.
    #[arg(long, env = "AZURE_TIMEOUT_SECS", default_value_t = 120)]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("deployments", &self.deployments)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn validate(self) -> Result<Self, anyhow::Error> {
        if !matches!(self.endpoint.scheme(), "http" | "https") {
            return Err(anyhow!(
                "Endpoint '{}' must be an http(s) URL",
                self.endpoint
            ));
        }
        if self.api_key.is_empty() {
            return Err(anyhow!("API key must not be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("Timeout must be at least one second"));
        }
        if let Some(path) = &self.deployments
            && !path.exists()
        {
            return Err(anyhow!(
                "Deployments file '{}' does not exist",
                path.display()
            ));
        }
        Ok(self)
    }

    pub fn upstream(&self) -> UpstreamConfig {
        UpstreamConfig::builder()
            .endpoint(self.endpoint.clone())
            .api_key(ApiKey::new(self.api_key.clone()))
            .api_version(self.api_version.clone())
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
    }
}
