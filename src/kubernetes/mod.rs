//! Kubernetes integration module
//!
//! Provides kubeconfig parsing, pod lookup, and running commands in pod
//! containers over the exec subresource.

pub mod client;
pub mod command;
pub mod config;
pub mod exec;
pub mod pod;

pub use client::{KubeClient, KubeClientError};
pub use command::{exec, exec_e, CommandOutput, ExecFailure, PodCommand};
pub use config::{KubeConfig, KubeConfigError, KubeContext, KubeCluster};
pub use exec::{classify_exit, ExecError, ExecParameters, ExecResult, StreamCapture, StreamExecutor, StreamOutcome};
pub use pod::{resolve_container, ContainerError, PodLocator, PodLookupError, PodPhase, PodSnapshot};
