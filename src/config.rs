use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::kubernetes::config::{KubeConfig, KubeConfigError};

/// Errors that can occur during config operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Selects the cluster, context and namespace commands run against
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubectlOptions {
    /// Kubeconfig context; the kubeconfig's current context when unset
    #[serde(default)]
    pub context_name: Option<String>,

    /// Kubeconfig file; `KUBECONFIG` or ~/.kube/config when unset
    #[serde(default)]
    pub config_path: Option<PathBuf>,

    /// Namespace; the context's namespace when unset
    #[serde(default)]
    pub namespace: Option<String>,
}

impl KubectlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, context_name: &str) -> Self {
        self.context_name = Some(context_name.to_string());
        self
    }

    pub fn with_config_path(mut self, config_path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(config_path.into());
        self
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Explicitly selected context, ignoring empty values
    pub fn context_name(&self) -> Option<&str> {
        self.context_name.as_deref().filter(|c| !c.is_empty())
    }

    /// Explicitly selected namespace, ignoring empty values
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    /// Kubeconfig file these options point at
    pub fn kubeconfig_path(&self) -> Result<PathBuf, KubeConfigError> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => KubeConfig::default_path(),
        }
    }

    /// Load options from a JSON file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let options: Self = serde_json::from_str(&contents)?;

        tracing::info!("Loaded kubectl options from {:?}", path);
        Ok(options)
    }

    /// Save options to a JSON file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;

        tracing::info!("Saved kubectl options to {:?}", path);
        Ok(())
    }
}
