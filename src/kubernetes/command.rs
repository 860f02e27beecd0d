//! Running commands in pods
//!
//! [`PodCommand`] ties the exec flow together: look the pod up, refuse
//! completed pods, pick the container, stream the command and turn the
//! result into a [`CommandOutput`].

use std::sync::Arc;

use thiserror::Error;

use super::client::KubeClient;
use super::exec::{classify_exit, ExecError, ExecParameters, StreamCapture, StreamExecutor, StreamOutcome};
use super::pod::{resolve_container, PodLocator};
use crate::config::KubectlOptions;
use crate::logger::{Logger, TracingLogger};

/// Captured result of a command run in a pod
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn new(stdout: &str, stderr: &str, exit_code: i32) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
        }
    }

    fn from_capture(capture: &StreamCapture, exit_code: i32) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&capture.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&capture.stderr).into_owned(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A failed exec, together with whatever output was captured before it failed
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ExecFailure {
    pub output: CommandOutput,
    pub error: ExecError,
}

impl ExecFailure {
    /// Failure raised before any output could be captured
    fn before_stream(error: impl Into<ExecError>) -> Self {
        Self {
            output: CommandOutput::default(),
            error: error.into(),
        }
    }

    /// Failure report naming `target` with the captured output
    fn report(&self, target: &str) -> String {
        format!(
            "exec in pod {} failed: {}\nstdout: {}\nstderr: {}",
            target, self.error, self.output.stdout, self.output.stderr
        )
    }
}

/// Runs commands in pod containers through injected collaborators
#[derive(Clone)]
pub struct PodCommand {
    locator: Arc<dyn PodLocator>,
    executor: Arc<dyn StreamExecutor>,
    logger: Arc<dyn Logger>,
}

impl PodCommand {
    pub fn new(locator: Arc<dyn PodLocator>, executor: Arc<dyn StreamExecutor>) -> Self {
        Self {
            locator,
            executor,
            logger: Arc::new(TracingLogger),
        }
    }

    /// Use a connected client for both pod lookups and exec streams
    pub fn from_client(client: KubeClient) -> Self {
        let client = Arc::new(client);
        Self::new(client.clone(), client)
    }

    /// Route diagnostics to `logger` instead of `tracing`
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Run `command` in a container of the named pod.
    ///
    /// An empty `container` picks the pod's default container. Fails when
    /// the pod is gone or completed, when the command could not be streamed,
    /// and when the remote process exits non-zero; in the last two cases the
    /// returned [`ExecFailure`] still carries the captured output.
    pub async fn exec_e<S: AsRef<str>>(
        &self,
        namespace: &str,
        pod_name: &str,
        container: &str,
        command: &[S],
    ) -> Result<CommandOutput, ExecFailure> {
        let pod = self
            .locator
            .get_pod(namespace, pod_name)
            .await
            .map_err(ExecFailure::before_stream)?;

        if pod.phase.is_terminal() {
            return Err(ExecFailure::before_stream(ExecError::TerminalPod { phase: pod.phase }));
        }

        let container = resolve_container(&pod, container, self.logger.as_ref())
            .map_err(ExecFailure::before_stream)?;
        let params = ExecParameters::build(&pod, &container, command)
            .map_err(ExecFailure::before_stream)?;

        tracing::debug!(
            "exec {:?} in {}/{} container {}",
            params.command,
            params.namespace,
            params.pod,
            params.container
        );

        let capture = self
            .executor
            .stream(&params)
            .await
            .map_err(ExecFailure::before_stream)?;

        let exit_code = classify_exit(&capture.outcome, self.logger.as_ref());
        let output = CommandOutput::from_capture(&capture, exit_code);

        match capture.outcome {
            StreamOutcome::Clean => Ok(output),
            StreamOutcome::NonZeroExit(code) => Err(ExecFailure {
                output,
                error: ExecError::NonZeroExit { code },
            }),
            StreamOutcome::Other(cause) => Err(ExecFailure {
                output,
                error: ExecError::Stream(cause),
            }),
        }
    }

    /// Like [`exec_e`](Self::exec_e), but fails the calling test on any error
    pub async fn exec<S: AsRef<str>>(
        &self,
        namespace: &str,
        pod_name: &str,
        container: &str,
        command: &[S],
    ) -> CommandOutput {
        match self.exec_e(namespace, pod_name, container, command).await {
            Ok(output) => output,
            Err(failure) => panic!("{}", failure.report(&format!("{}/{}", namespace, pod_name))),
        }
    }
}

/// Connect with `options` and run `command` in a container of `pod_name`.
///
/// The namespace comes from `options`, falling back to the kubeconfig
/// context's namespace.
pub async fn exec_e<S: AsRef<str>>(
    options: &KubectlOptions,
    pod_name: &str,
    container: &str,
    command: &[S],
) -> Result<CommandOutput, ExecFailure> {
    let client = KubeClient::for_options(options)
        .await
        .map_err(ExecFailure::before_stream)?;
    let namespace = client.namespace().to_string();

    PodCommand::from_client(client)
        .exec_e(&namespace, pod_name, container, command)
        .await
}

/// Like [`exec_e`], but fails the calling test on any error
pub async fn exec<S: AsRef<str>>(
    options: &KubectlOptions,
    pod_name: &str,
    container: &str,
    command: &[S],
) -> CommandOutput {
    match exec_e(options, pod_name, container, command).await {
        Ok(output) => output,
        Err(failure) => {
            let target = match options.namespace() {
                Some(namespace) => format!("{}/{}", namespace, pod_name),
                None => pod_name.to_string(),
            };
            panic!("{}", failure.report(&target))
        }
    }
}
