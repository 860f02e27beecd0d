//! Kubeconfig discovery and context selection
//!
//! Reads kubeconfig files (typically ~/.kube/config) far enough to pick a
//! context and the namespace commands should run in. Authentication is left
//! to the kube crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KubeConfigError {
    #[error("Failed to read kubeconfig: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse kubeconfig: {0}")]
    ParseError(#[from] serde_yaml_ng::Error),
    #[error("Context not found: {0}")]
    ContextNotFound(String),
    #[error("No kubeconfig found")]
    NotFound,
}

/// A Kubernetes cluster from kubeconfig
#[derive(Debug, Clone)]
pub struct KubeCluster {
    pub name: String,
    pub server: String,
}

/// A Kubernetes context from kubeconfig
#[derive(Debug, Clone)]
pub struct KubeContext {
    pub name: String,
    pub cluster: String,
    pub user: String,
    pub namespace: Option<String>,
}

/// Parsed kubeconfig
#[derive(Debug, Clone)]
pub struct KubeConfig {
    pub path: PathBuf,
    pub current_context: Option<String>,
    pub contexts: Vec<KubeContext>,
    pub clusters: HashMap<String, KubeCluster>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawKubeConfig {
    #[serde(default)]
    current_context: Option<String>,
    #[serde(default)]
    contexts: Option<Vec<RawNamed<RawContext>>>,
    #[serde(default)]
    clusters: Option<Vec<RawNamed<RawCluster>>>,
}

#[derive(Deserialize)]
struct RawNamed<T> {
    name: String,
    #[serde(alias = "context", alias = "cluster")]
    item: Option<T>,
}

#[derive(Deserialize, Default)]
struct RawContext {
    #[serde(default)]
    cluster: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawCluster {
    #[serde(default)]
    server: String,
}

impl KubeConfig {
    /// Get the default kubeconfig path: the first existing `KUBECONFIG`
    /// entry, then ~/.kube/config
    pub fn default_path() -> Result<PathBuf, KubeConfigError> {
        if let Some(kubeconfig) = std::env::var_os("KUBECONFIG") {
            if let Some(path) = std::env::split_paths(&kubeconfig).find(|p| p.exists()) {
                return Ok(path);
            }
        }

        let home = dirs::home_dir().ok_or(KubeConfigError::NotFound)?;
        let path = home.join(".kube").join("config");
        if path.exists() {
            Ok(path)
        } else {
            Err(KubeConfigError::NotFound)
        }
    }

    /// Load kubeconfig from a specific path
    pub fn load_from(path: &Path) -> Result<Self, KubeConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path.to_path_buf())
    }

    fn parse(content: &str, path: PathBuf) -> Result<Self, KubeConfigError> {
        let raw: RawKubeConfig = serde_yaml_ng::from_str(content)?;

        let contexts = raw
            .contexts
            .unwrap_or_default()
            .into_iter()
            .map(|named| {
                let context = named.item.unwrap_or_default();
                KubeContext {
                    name: named.name,
                    cluster: context.cluster,
                    user: context.user,
                    namespace: context.namespace.filter(|ns| !ns.is_empty()),
                }
            })
            .collect();

        let clusters = raw
            .clusters
            .unwrap_or_default()
            .into_iter()
            .map(|named| {
                let cluster = named.item.unwrap_or_default();
                let name = named.name;
                (name.clone(), KubeCluster { name, server: cluster.server })
            })
            .collect();

        Ok(Self {
            path,
            current_context: raw.current_context.filter(|c| !c.is_empty()),
            contexts,
            clusters,
        })
    }

    /// Get the current context
    pub fn current_context(&self) -> Option<&KubeContext> {
        self.current_context
            .as_ref()
            .and_then(|name| self.get_context(name))
    }

    /// Get a context by name
    pub fn get_context(&self, name: &str) -> Option<&KubeContext> {
        self.contexts.iter().find(|c| c.name == name)
    }

    /// Get a cluster by name
    pub fn get_cluster(&self, name: &str) -> Option<&KubeCluster> {
        self.clusters.get(name)
    }
}
