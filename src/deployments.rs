//! Public model names map onto Azure deployments. The map is read once at startup (from a JSON
//! file, or the built-in table when none is given) and never changes afterwards.
//!
//! Lookups are exact and case-sensitive.
use anyhow::anyhow;
use serde::Deserialize;
use std::{collections::HashMap, path::Path, sync::Arc};
use tracing::{debug, info};

/// Models served when no deployment file is configured, each on a deployment of the same name.
const BUILTIN_MODELS: [&str; 3] = ["Phi-4-multimodal-instruct", "gpt-4o", "Phi-3.5-vision-instruct"];

/// The deployment file contains a map of public model names to deployment ids.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub deployments: HashMap<String, String>,
}

/// Read-only lookup from model name to deployment id. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DeploymentMap {
    deployments: Arc<HashMap<String, String>>,
}

impl DeploymentMap {
    pub async fn from_config_file(config_path: &Path) -> Result<Self, anyhow::Error> {
        let contents = tokio::fs::read_to_string(config_path).await.map_err(|e| {
            anyhow!(
                "Failed to read deployments file {}: {}",
                config_path.display(),
                e
            )
        })?;

        let config_file: ConfigFile = serde_json::from_str(&contents).map_err(|e| {
            anyhow!(
                "Failed to parse deployments file {}: {}",
                config_path.display(),
                e
            )
        })?;

        let deployments = Self::from_config(config_file)?;

        info!(
            "Loaded {} deployments from {}",
            deployments.len(),
            config_path.display()
        );
        Ok(deployments)
    }

    pub fn from_config(config_file: ConfigFile) -> Result<Self, anyhow::Error> {
        for (model, deployment) in &config_file.deployments {
            if model.is_empty() {
                return Err(anyhow!("Deployment file contains an empty model name"));
            }
            if deployment.is_empty() {
                return Err(anyhow!("Model {} maps to an empty deployment id", model));
            }
            debug!("Model {} -> deployment {}", model, deployment);
        }

        Ok(Self {
            deployments: Arc::new(config_file.deployments),
        })
    }

    /// The table used when no deployment file is configured.
    pub fn builtin() -> Self {
        let deployments = BUILTIN_MODELS
            .iter()
            .map(|model| (model.to_string(), model.to_string()))
            .collect();
        Self {
            deployments: Arc::new(deployments),
        }
    }

    pub fn resolve(&self, model: &str) -> Option<&str> {
        self.deployments.get(model).map(String::as_str)
    }

    /// Public model names, sorted.
    pub fn model_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.deployments.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.deployments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DeploymentMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let deployments = iter
            .into_iter()
            .map(|(model, deployment)| (model.into(), deployment.into()))
            .collect();
        Self {
            deployments: Arc::new(deployments),
        }
    }
}
