//! Kubernetes pod exec functionality
//!
//! Builds exec requests, drains the remote process's output over the exec
//! subresource's multiplexed websocket, and classifies how the process
//! ended.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use kube::api::{AttachParams, AttachedProcess};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::client::KubeClientError;
use super::pod::{ContainerError, PodLookupError, PodPhase, PodSnapshot};
use crate::logger::Logger;

/// Exit code reported when the stream ended without a usable exit status
pub const UNKNOWN_EXIT_CODE: i32 = -1;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to resolve cluster connection: {0}")]
    Config(#[from] KubeClientError),
    #[error(transparent)]
    PodLookup(#[from] PodLookupError),
    #[error("cannot exec into a container in a completed pod; current phase is {phase}")]
    TerminalPod { phase: PodPhase },
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("command must not be empty")]
    EmptyCommand,
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("command terminated with exit code {code}")]
    NonZeroExit { code: i32 },
    #[error("Remote command error: {0}")]
    Stream(String),
}

pub type ExecResult<T> = Result<T, ExecError>;

impl ExecError {
    /// Exit code carried by a remote process that ran and exited non-zero
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { code } => Some(*code),
            _ => None,
        }
    }
}

/// Everything the exec subresource needs to run one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecParameters {
    pub pod: String,
    pub namespace: String,
    pub container: String,
    pub command: Vec<String>,
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub tty: bool,
}

impl ExecParameters {
    /// Build the request for running `command` in `container` of `pod`.
    ///
    /// Output is captured from stdout and stderr; stdin and tty are never
    /// attached. The container must be one of the pod's regular or
    /// ephemeral containers.
    pub fn build<S: AsRef<str>>(
        pod: &PodSnapshot,
        container: &str,
        command: &[S],
    ) -> ExecResult<Self> {
        if container.is_empty() || !pod.has_container(container) {
            return Err(ContainerError::NotFound {
                pod: pod.name.clone(),
                container: container.to_string(),
            }
            .into());
        }
        if command.is_empty() {
            return Err(ExecError::EmptyCommand);
        }

        Ok(Self {
            pod: pod.name.clone(),
            namespace: pod.namespace.clone(),
            container: container.to_string(),
            command: command.iter().map(|arg| arg.as_ref().to_string()).collect(),
            stdin: false,
            stdout: true,
            stderr: true,
            tty: false,
        })
    }

    /// Attach parameters for the kube exec call
    pub fn attach_params(&self) -> AttachParams {
        AttachParams::default()
            .container(self.container.clone())
            .stdin(self.stdin)
            .stdout(self.stdout)
            .stderr(self.stderr)
            .tty(self.tty)
    }
}

/// How an exec stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The remote process exited zero
    Clean,
    /// The remote process ran and exited with this code
    NonZeroExit(i32),
    /// Transport or protocol failure after the stream was established
    Other(String),
}

/// Output drained from an exec stream, plus how it ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCapture {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub outcome: StreamOutcome,
}

impl StreamCapture {
    pub fn new(stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>, outcome: StreamOutcome) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            outcome,
        }
    }
}

/// Runs a command over an upgraded exec connection.
///
/// Implementations return `Err` only when the connection itself could not be
/// established (`ExecError::Connection`). Everything that happens once the
/// stream is up is reported through [`StreamCapture::outcome`].
#[async_trait]
pub trait StreamExecutor: Send + Sync {
    async fn stream(&self, params: &ExecParameters) -> ExecResult<StreamCapture>;
}

/// Map how a stream ended to a process exit code.
///
/// Unclassified failures become [`UNKNOWN_EXIT_CODE`] and are reported to
/// `logger` as a warning.
pub fn classify_exit(outcome: &StreamOutcome, logger: &dyn Logger) -> i32 {
    match outcome {
        StreamOutcome::Clean => 0,
        StreamOutcome::NonZeroExit(code) => *code,
        StreamOutcome::Other(cause) => {
            logger.warn(&format!("Non-exit code error: {}", cause));
            UNKNOWN_EXIT_CODE
        }
    }
}

/// Status object the API server sends on the error channel when the remote
/// process finishes
#[derive(Debug, Default, Deserialize)]
struct ExecStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<ExecStatusDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecStatusDetails {
    #[serde(default)]
    causes: Option<Vec<ExecStatusCause>>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecStatusCause {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ExecStatus {
    fn outcome(&self) -> StreamOutcome {
        match self.status.as_deref() {
            Some("Success") => StreamOutcome::Clean,
            Some("Failure") if self.reason.as_deref() == Some("NonZeroExitCode") => {
                let exit_cause = self
                    .details
                    .as_ref()
                    .and_then(|d| d.causes.as_ref())
                    .and_then(|causes| {
                        causes.iter().find(|c| c.reason.as_deref() == Some("ExitCode"))
                    });

                match exit_cause.and_then(|c| c.message.as_deref()) {
                    Some(value) => match value.trim().parse::<i32>() {
                        Ok(code) => StreamOutcome::NonZeroExit(code),
                        Err(_) => StreamOutcome::Other(format!(
                            "error stream protocol error: invalid exit code value {:?}",
                            value
                        )),
                    },
                    None => StreamOutcome::Other(
                        "error stream protocol error: missing exit code".to_string(),
                    ),
                }
            }
            _ => StreamOutcome::Other(format!(
                "error executing remote command: {}",
                self.message.as_deref().unwrap_or("unknown error")
            )),
        }
    }
}

/// Decode the status object kube hands back for a finished exec
pub(crate) fn outcome_from_status<T: Serialize>(status: &T) -> StreamOutcome {
    match serde_json::to_value(status).and_then(serde_json::from_value::<ExecStatus>) {
        Ok(status) => status.outcome(),
        Err(e) => StreamOutcome::Other(format!("error decoding exec status: {}", e)),
    }
}

/// Read a channel to EOF, keeping whatever arrived before a read error
async fn drain<R: AsyncRead + Unpin>(reader: Option<R>) -> (Vec<u8>, Option<std::io::Error>) {
    let mut buf = Vec::new();
    let Some(mut reader) = reader else {
        return (buf, None);
    };
    match reader.read_to_end(&mut buf).await {
        Ok(_) => (buf, None),
        Err(e) => (buf, Some(e)),
    }
}

/// Drain stdout and stderr of an attached process concurrently and wait
/// for it to finish
pub(crate) async fn collect(mut attached: AttachedProcess) -> StreamCapture {
    let status = attached.take_status();
    let stdout = attached.stdout();
    let stderr = attached.stderr();

    let status = async move {
        match status {
            Some(status) => status.await,
            None => None,
        }
    };

    collect_streams(stdout, stderr, status, attached.join()).await
}

/// Drain both output channels together, then settle the outcome.
///
/// A read error on either channel wins, then the terminal status, then the
/// result of joining the session.
pub(crate) async fn collect_streams<O, E, T, JE>(
    stdout: Option<O>,
    stderr: Option<E>,
    status: impl Future<Output = Option<T>>,
    join: impl Future<Output = Result<(), JE>>,
) -> StreamCapture
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
    T: Serialize + fmt::Debug,
    JE: fmt::Display,
{
    let ((stdout, stdout_err), (stderr, stderr_err)) =
        futures::join!(drain(stdout), drain(stderr));

    let status = status.await;
    let joined = join.await;

    let outcome = if let Some(e) = stdout_err.or(stderr_err) {
        StreamOutcome::Other(format!("error reading exec output: {}", e))
    } else if let Some(status) = status {
        tracing::debug!("exec finished with status {:?}", status);
        outcome_from_status(&status)
    } else {
        match joined {
            Ok(()) => StreamOutcome::Clean,
            Err(e) => StreamOutcome::Other(e.to_string()),
        }
    };

    StreamCapture {
        stdout,
        stderr,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::RecordingLogger;
    use serde_json::{json, Value};
    use std::future::ready;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, ReadBuf};

    /// Reader whose every read fails, as a dropped websocket would
    struct BrokenPipe;

    impl AsyncRead for BrokenPipe {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")))
        }
    }

    fn no_status() -> impl Future<Output = Option<Value>> {
        ready(None)
    }

    fn joined_ok() -> impl Future<Output = Result<(), io::Error>> {
        ready(Ok(()))
    }

    fn pod() -> PodSnapshot {
        PodSnapshot::new("app-1", "web", PodPhase::Running)
            .with_container("main")
            .with_ephemeral_container("debugger")
    }

    #[test]
    fn test_build_fixes_stream_flags() {
        let params = ExecParameters::build(&pod(), "main", &["echo", "hi"]).unwrap();

        assert_eq!(params.pod, "app-1");
        assert_eq!(params.namespace, "web");
        assert_eq!(params.container, "main");
        assert_eq!(params.command, vec!["echo", "hi"]);
        assert!(!params.stdin);
        assert!(params.stdout);
        assert!(params.stderr);
        assert!(!params.tty);
    }

    #[test]
    fn test_build_accepts_ephemeral_container() {
        let params = ExecParameters::build(&pod(), "debugger", &["ls"]).unwrap();
        assert_eq!(params.container, "debugger");
    }

    #[test]
    fn test_build_rejects_unknown_container() {
        let err = ExecParameters::build(&pod(), "missing", &["ls"]).unwrap_err();
        assert!(matches!(
            err,
            ExecError::Container(ContainerError::NotFound { ref container, .. }) if container == "missing"
        ));
    }

    #[test]
    fn test_build_rejects_empty_container_and_command() {
        assert!(matches!(
            ExecParameters::build(&pod(), "", &["ls"]),
            Err(ExecError::Container(_))
        ));

        let empty: [&str; 0] = [];
        assert!(matches!(
            ExecParameters::build(&pod(), "main", &empty),
            Err(ExecError::EmptyCommand)
        ));
    }

    #[test]
    fn test_attach_params_match_flags() {
        let params = ExecParameters::build(&pod(), "main", &["ls"]).unwrap();
        let ap = params.attach_params();

        assert_eq!(ap.container.as_deref(), Some("main"));
        assert!(!ap.stdin);
        assert!(ap.stdout);
        assert!(ap.stderr);
        assert!(!ap.tty);
    }

    #[test]
    fn test_classify_clean_and_exit_codes() {
        let logger = RecordingLogger::new();

        assert_eq!(classify_exit(&StreamOutcome::Clean, &logger), 0);
        assert_eq!(classify_exit(&StreamOutcome::NonZeroExit(2), &logger), 2);
        assert_eq!(classify_exit(&StreamOutcome::NonZeroExit(-9), &logger), -9);
        assert_eq!(classify_exit(&StreamOutcome::NonZeroExit(300), &logger), 300);
        assert!(logger.entries().is_empty());
    }

    #[test]
    fn test_classify_other_warns_once() {
        let logger = RecordingLogger::new();

        let code = classify_exit(&StreamOutcome::Other("connection reset".into()), &logger);

        assert_eq!(code, UNKNOWN_EXIT_CODE);
        assert_eq!(logger.warnings(), vec!["Non-exit code error: connection reset"]);
    }

    #[test]
    fn test_status_success() {
        let status = json!({ "status": "Success", "metadata": {} });
        assert_eq!(outcome_from_status(&status), StreamOutcome::Clean);
    }

    #[test]
    fn test_status_non_zero_exit() {
        let status = json!({
            "status": "Failure",
            "message": "command terminated with non-zero exit code: exit status 2",
            "reason": "NonZeroExitCode",
            "details": {
                "causes": [ { "reason": "ExitCode", "message": "2" } ]
            }
        });
        assert_eq!(outcome_from_status(&status), StreamOutcome::NonZeroExit(2));
    }

    #[test]
    fn test_status_invalid_exit_code() {
        let status = json!({
            "status": "Failure",
            "reason": "NonZeroExitCode",
            "details": { "causes": [ { "reason": "ExitCode", "message": "two" } ] }
        });
        assert!(matches!(outcome_from_status(&status), StreamOutcome::Other(msg) if msg.contains("invalid exit code")));
    }

    #[test]
    fn test_status_other_failure() {
        let status = json!({
            "status": "Failure",
            "reason": "InternalError",
            "message": "container not running"
        });
        assert_eq!(
            outcome_from_status(&status),
            StreamOutcome::Other("error executing remote command: container not running".into())
        );
    }

    #[test]
    fn test_exit_code_only_for_non_zero_exit() {
        assert_eq!(ExecError::NonZeroExit { code: 2 }.exit_code(), Some(2));
        assert_eq!(ExecError::Stream("boom".into()).exit_code(), None);
        assert_eq!(
            ExecError::TerminalPod { phase: PodPhase::Succeeded }.to_string(),
            "cannot exec into a container in a completed pod; current phase is Succeeded"
        );
    }

    #[tokio::test]
    async fn test_collect_drains_channels_concurrently() {
        let (mut stdout_tx, stdout_rx) = tokio::io::duplex(64);
        let (mut stderr_tx, stderr_rx) = tokio::io::duplex(64);

        // stderr fills well past the pipe buffer before stdout is closed
        let writer = tokio::spawn(async move {
            stderr_tx.write_all(&[b'e'; 4096]).await.unwrap();
            drop(stderr_tx);
            stdout_tx.write_all(b"done\n").await.unwrap();
        });

        let capture = tokio::time::timeout(
            Duration::from_secs(5),
            collect_streams(Some(stdout_rx), Some(stderr_rx), no_status(), joined_ok()),
        )
        .await
        .expect("draining one channel at a time deadlocks");
        writer.await.unwrap();

        assert_eq!(capture.stdout, b"done\n");
        assert_eq!(capture.stderr.len(), 4096);
        assert_eq!(capture.outcome, StreamOutcome::Clean);
    }

    #[tokio::test]
    async fn test_collect_read_error_keeps_partial_output() {
        let stdout = (&b"partial"[..]).chain(BrokenPipe);
        let stderr: &[u8] = b"warn\n";
        let status = ready(Some(json!({ "status": "Success" })));

        let capture = collect_streams(Some(stdout), Some(stderr), status, joined_ok()).await;

        assert_eq!(capture.stdout, b"partial");
        assert_eq!(capture.stderr, b"warn\n");
        assert!(matches!(
            capture.outcome,
            StreamOutcome::Other(ref cause) if cause.starts_with("error reading exec output") && cause.contains("connection reset")
        ));
    }

    #[tokio::test]
    async fn test_collect_read_error_on_stderr() {
        let stdout: &[u8] = b"out";

        let capture = collect_streams(Some(stdout), Some(BrokenPipe), no_status(), joined_ok()).await;

        assert_eq!(capture.stdout, b"out");
        assert!(capture.stderr.is_empty());
        assert!(matches!(capture.outcome, StreamOutcome::Other(_)));
    }

    #[tokio::test]
    async fn test_collect_status_wins_over_join_error() {
        let stdout: &[u8] = b"partial\n";
        let status = ready(Some(json!({
            "status": "Failure",
            "reason": "NonZeroExitCode",
            "details": { "causes": [ { "reason": "ExitCode", "message": "3" } ] }
        })));
        let join = ready(Err::<(), _>(io::Error::new(io::ErrorKind::Other, "session closed")));

        let capture = collect_streams(Some(stdout), None::<&[u8]>, status, join).await;

        assert_eq!(capture.stdout, b"partial\n");
        assert_eq!(capture.outcome, StreamOutcome::NonZeroExit(3));
    }

    #[tokio::test]
    async fn test_collect_without_status() {
        let stdout: &[u8] = b"hi\n";
        let capture = collect_streams(Some(stdout), None::<&[u8]>, no_status(), joined_ok()).await;
        assert_eq!(capture, StreamCapture::new("hi\n", "", StreamOutcome::Clean));

        let join = ready(Err::<(), _>(io::Error::new(io::ErrorKind::Other, "session closed")));
        let capture = collect_streams(None::<&[u8]>, None::<&[u8]>, no_status(), join).await;
        assert_eq!(capture.outcome, StreamOutcome::Other("session closed".into()));
    }
}
