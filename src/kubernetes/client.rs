//! Kubernetes API client
//!
//! Wraps the kube crate to look pods up and run exec streams against them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{api::Api, config::Kubeconfig, Client, Config};
use thiserror::Error;
use tokio::sync::RwLock;

use super::config::{KubeConfig, KubeConfigError, KubeContext};
use super::exec::{self, ExecError, ExecParameters, ExecResult, StreamCapture, StreamExecutor};
use super::pod::{PodLocator, PodLookupError, PodSnapshot};
use crate::config::KubectlOptions;

/// Namespace used when neither the options nor the context name one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Context name reported for clients built from the in-cluster environment
const IN_CLUSTER_CONTEXT: &str = "in-cluster";

/// Global client cache - avoids recreating clients (expensive TLS handshake) for each exec
static CLIENT_CACHE: OnceLock<RwLock<HashMap<String, Client>>> = OnceLock::new();

fn get_client_cache() -> &'static RwLock<HashMap<String, Client>> {
    CLIENT_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

#[derive(Debug, Error)]
pub enum KubeClientError {
    #[error("Failed to create client: {0}")]
    ClientError(#[from] kube::Error),
    #[error("Failed to load config: {0}")]
    ConfigError(#[from] kube::config::KubeconfigError),
    #[error("Failed to infer config: {0}")]
    InferError(#[from] kube::config::InferConfigError),
    #[error(transparent)]
    Kubeconfig(#[from] KubeConfigError),
    #[error("No context available")]
    NoContext,
}

/// Kubernetes API client bound to a context and namespace
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
    context_name: String,
    namespace: String,
}

impl KubeClient {
    /// Wrap an already-built kube client
    pub fn new(client: Client, context_name: &str, namespace: &str) -> Self {
        Self {
            client,
            context_name: context_name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    /// Create a client from the environment (kubeconfig or in-cluster service account)
    pub async fn infer() -> Result<Self, KubeClientError> {
        let config = Config::infer().await?;
        let namespace = config.default_namespace.clone();
        let client = Client::try_from(config)?;
        Ok(Self {
            client,
            context_name: IN_CLUSTER_CONTEXT.to_string(),
            namespace,
        })
    }

    /// Create a client for the kubeconfig, context and namespace selected by `options`.
    ///
    /// Without an explicit kubeconfig path and with no kubeconfig on disk,
    /// falls back to the in-cluster configuration.
    pub async fn for_options(options: &KubectlOptions) -> Result<Self, KubeClientError> {
        let path = match options.kubeconfig_path() {
            Ok(path) => path,
            Err(KubeConfigError::NotFound) => {
                tracing::info!("No kubeconfig found, using in-cluster configuration");
                let mut client = Self::infer().await?;
                if let Some(namespace) = options.namespace() {
                    client.namespace = namespace.to_string();
                }
                return Ok(client);
            }
            Err(e) => return Err(e.into()),
        };

        let kubeconfig = KubeConfig::load_from(&path)?;
        let (context, namespace) = select_target(options, &kubeconfig)?;
        if let Some(cluster) = kubeconfig.get_cluster(&context.cluster) {
            tracing::debug!("Using context {} on {}", context.name, cluster.server);
        }

        let client = Self::cached_client(&path, &context.name).await?;

        Ok(Self {
            client,
            context_name: context.name.clone(),
            namespace,
        })
    }

    async fn cached_client(path: &Path, context_name: &str) -> Result<Client, KubeClientError> {
        let cache = get_client_cache();
        let key = format!("{}#{}", path.display(), context_name);

        // Try to get from cache first (fast path)
        {
            let read_guard = cache.read().await;
            if let Some(client) = read_guard.get(&key) {
                tracing::debug!("K8s client cache HIT for {}", key);
                return Ok(client.clone());
            }
        }

        tracing::info!("K8s client cache MISS for {} - creating new client", key);
        let start = std::time::Instant::now();

        let options = kube::config::KubeConfigOptions {
            context: Some(context_name.to_string()),
            ..Default::default()
        };
        let kubeconfig = Kubeconfig::read_from(path)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &options).await?;
        let client = Client::try_from(config)?;

        cache.write().await.insert(key, client.clone());

        tracing::info!("K8s client for {} created in {:?}", context_name, start.elapsed());
        Ok(client)
    }

    /// Get the context name this client is connected to
    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    /// Namespace commands run in unless a caller names another
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get the raw kube client
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Pick the context and namespace `options` select from `kubeconfig`.
///
/// The namespace is the explicit option, then the context's namespace, then
/// [`DEFAULT_NAMESPACE`].
fn select_target<'a>(
    options: &KubectlOptions,
    kubeconfig: &'a KubeConfig,
) -> Result<(&'a KubeContext, String), KubeClientError> {
    let context = match options.context_name() {
        Some(name) => kubeconfig
            .get_context(name)
            .ok_or_else(|| KubeConfigError::ContextNotFound(name.to_string()))?,
        None => kubeconfig.current_context().ok_or(KubeClientError::NoContext)?,
    };

    let namespace = options
        .namespace()
        .or(context.namespace.as_deref())
        .unwrap_or(DEFAULT_NAMESPACE)
        .to_string();

    Ok((context, namespace))
}

#[async_trait]
impl PodLocator for KubeClient {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodSnapshot, PodLookupError> {
        let start = std::time::Instant::now();
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = pods.get_opt(name).await.map_err(|e| PodLookupError::Transport {
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: e.to_string(),
        })?;
        tracing::debug!("get_pod({}/{}) API call took {:?}", namespace, name, start.elapsed());

        let pod = pod.ok_or_else(|| PodLookupError::NotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

        let mut snapshot = PodSnapshot::from(pod);
        if snapshot.namespace.is_empty() {
            snapshot.namespace = namespace.to_string();
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl StreamExecutor for KubeClient {
    async fn stream(&self, params: &ExecParameters) -> ExecResult<StreamCapture> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &params.namespace);

        let attached = pods
            .exec(&params.pod, params.command.clone(), &params.attach_params())
            .await
            .map_err(|e| ExecError::Connection(e.to_string()))?;
        tracing::debug!("exec stream opened for {}/{}", params.namespace, params.pod);

        Ok(exec::collect(attached).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: minikube
clusters:
- name: minikube
  cluster:
    server: https://192.168.49.2:8443
contexts:
- name: minikube
  context:
    cluster: minikube
    user: minikube
    namespace: apps
- name: production
  context:
    cluster: minikube
    user: admin
"#;

    fn write_kubeconfig(content: &str) -> (TempDir, KubeConfig) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, content).unwrap();
        let kubeconfig = KubeConfig::load_from(&path).unwrap();
        (dir, kubeconfig)
    }

    #[test]
    fn test_explicit_namespace_wins() {
        let (_dir, kubeconfig) = write_kubeconfig(KUBECONFIG);
        let options = KubectlOptions::new().with_namespace("web");

        let (context, namespace) = select_target(&options, &kubeconfig).unwrap();

        assert_eq!(context.name, "minikube");
        assert_eq!(namespace, "web");
    }

    #[test]
    fn test_context_namespace_used_when_unset() {
        let (_dir, kubeconfig) = write_kubeconfig(KUBECONFIG);

        let (context, namespace) = select_target(&KubectlOptions::new(), &kubeconfig).unwrap();

        assert_eq!(context.name, "minikube");
        assert_eq!(namespace, "apps");
    }

    #[test]
    fn test_default_namespace_fallback() {
        let (_dir, kubeconfig) = write_kubeconfig(KUBECONFIG);
        let options = KubectlOptions::new().with_context("production").with_namespace("");

        let (context, namespace) = select_target(&options, &kubeconfig).unwrap();

        assert_eq!(context.name, "production");
        assert_eq!(namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_unknown_context() {
        let (_dir, kubeconfig) = write_kubeconfig(KUBECONFIG);
        let options = KubectlOptions::new().with_context("staging");

        let err = select_target(&options, &kubeconfig).unwrap_err();

        assert!(matches!(
            err,
            KubeClientError::Kubeconfig(KubeConfigError::ContextNotFound(ref name)) if name == "staging"
        ));
    }

    #[test]
    fn test_no_current_context() {
        let (_dir, kubeconfig) = write_kubeconfig("apiVersion: v1\nkind: Config\n");

        let err = select_target(&KubectlOptions::new(), &kubeconfig).unwrap_err();

        assert!(matches!(err, KubeClientError::NoContext));
    }

    #[tokio::test]
    async fn test_missing_explicit_kubeconfig_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = KubectlOptions::new().with_config_path(dir.path().join("missing"));

        let err = KubeClient::for_options(&options).await.err().unwrap();

        assert!(matches!(
            err,
            KubeClientError::Kubeconfig(KubeConfigError::ReadError(_))
        ));
    }
}
