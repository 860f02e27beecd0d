//! Pod snapshots and container resolution
//!
//! A [`PodSnapshot`] is the read-only view of a pod the exec flow works from:
//! its identity, lifecycle phase and declared containers.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use thiserror::Error;

use crate::logger::Logger;

/// Annotation kubectl uses to mark the container commands go to by default
pub const DEFAULT_CONTAINER_ANNOTATION: &str = "kubectl.kubernetes.io/default-container";

#[derive(Debug, Error)]
pub enum PodLookupError {
    #[error("Pod not found: {namespace}/{name}")]
    NotFound { namespace: String, name: String },
    #[error("Failed to get pod {namespace}/{name}: {message}")]
    Transport {
        namespace: String,
        name: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    #[error("pod {namespace}/{pod} does not have any containers")]
    NoContainers { namespace: String, pod: String },
    #[error("container {container} is not valid for pod {pod}")]
    NotFound { pod: String, container: String },
}

/// Coarse lifecycle state of a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Parse the phase string reported in the pod status
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        }
    }

    /// Containers of a pod in a terminal phase are no longer running
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSnapshot {
    pub name: String,
    pub namespace: String,
    pub phase: PodPhase,
    /// Regular containers, in declared order
    pub containers: Vec<String>,
    pub init_containers: Vec<String>,
    pub ephemeral_containers: Vec<String>,
    pub annotations: BTreeMap<String, String>,
}

impl PodSnapshot {
    pub fn new(name: &str, namespace: &str, phase: PodPhase) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            phase,
            containers: Vec::new(),
            init_containers: Vec::new(),
            ephemeral_containers: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }

    /// Append a regular container
    pub fn with_container(mut self, name: &str) -> Self {
        self.containers.push(name.to_string());
        self
    }

    pub fn with_init_container(mut self, name: &str) -> Self {
        self.init_containers.push(name.to_string());
        self
    }

    pub fn with_ephemeral_container(mut self, name: &str) -> Self {
        self.ephemeral_containers.push(name.to_string());
        self
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    /// Container named by the default-container annotation, if set
    pub fn default_container_annotation(&self) -> Option<&str> {
        self.annotations
            .get(DEFAULT_CONTAINER_ANNOTATION)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Whether commands can be exec'd into the named container
    pub fn has_container(&self, name: &str) -> bool {
        self.containers
            .iter()
            .chain(self.ephemeral_containers.iter())
            .any(|c| c == name)
    }

    /// Every container name, formatted the way kubectl lists them
    fn all_container_names(&self) -> String {
        self.containers
            .iter()
            .cloned()
            .chain(self.ephemeral_containers.iter().map(|c| format!("{} (ephem)", c)))
            .chain(self.init_containers.iter().map(|c| format!("{} (init)", c)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<Pod> for PodSnapshot {
    fn from(pod: Pod) -> Self {
        let name = pod.metadata.name.unwrap_or_default();
        let namespace = pod.metadata.namespace.unwrap_or_default();
        let annotations = pod.metadata.annotations.unwrap_or_default();

        let phase = pod
            .status
            .and_then(|s| s.phase)
            .map(|p| PodPhase::parse(&p))
            .unwrap_or(PodPhase::Unknown);

        let (containers, init_containers, ephemeral_containers) = match pod.spec {
            Some(spec) => (
                spec.containers.into_iter().map(|c| c.name).collect(),
                spec.init_containers
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| c.name)
                    .collect(),
                spec.ephemeral_containers
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| c.name)
                    .collect(),
            ),
            None => (vec![], vec![], vec![]),
        };

        Self {
            name,
            namespace,
            phase,
            containers,
            init_containers,
            ephemeral_containers,
            annotations,
        }
    }
}

/// Looks up pods by namespace and name
#[async_trait]
pub trait PodLocator: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodSnapshot, PodLookupError>;
}

/// Pick the container a command should run in.
///
/// A non-empty `requested` name is returned unchanged. Otherwise the
/// annotated default container wins when the pod has it (regular or
/// ephemeral), falling back to the first declared container. Fallbacks are reported to `logger` as a single informational
/// diagnostic.
pub fn resolve_container(
    pod: &PodSnapshot,
    requested: &str,
    logger: &dyn Logger,
) -> Result<String, ContainerError> {
    if !requested.is_empty() {
        return Ok(requested.to_string());
    }

    let Some(first) = pod.containers.first() else {
        return Err(ContainerError::NoContainers {
            namespace: pod.namespace.clone(),
            pod: pod.name.clone(),
        });
    };

    let mut notes = Vec::new();

    if let Some(annotated) = pod.default_container_annotation() {
        if pod.has_container(annotated) {
            return Ok(annotated.to_string());
        }
        notes.push(format!(
            "Default container name {:?} not found in pod {}",
            annotated, pod.name
        ));
    }

    if pod.containers.len() > 1
        || !pod.init_containers.is_empty()
        || !pod.ephemeral_containers.is_empty()
    {
        notes.push(format!(
            "Defaulted container {:?} out of: {}",
            first,
            pod.all_container_names()
        ));
    }

    if !notes.is_empty() {
        logger.info(&notes.join("\n"));
    }

    Ok(first.clone())
}
