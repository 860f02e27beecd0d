use std::path::PathBuf;

use clap::Parser;

use podexec::{ConfigError, KubectlOptions};

#[derive(Debug, Parser)]
#[command(
    name = "podexec",
    version,
    about = "Run a command in a Kubernetes pod and capture its output"
)]
pub struct Cli {
    /// Kubeconfig file (defaults to KUBECONFIG or ~/.kube/config)
    #[arg(long = "kubeconfig")]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context (defaults to the current context)
    #[arg(long = "context")]
    pub context: Option<String>,

    /// Namespace (defaults to the context's namespace)
    #[arg(short = 'n', long = "namespace")]
    pub namespace: Option<String>,

    /// JSON file with kubectl options; flags override its values
    #[arg(long = "options")]
    pub options: Option<PathBuf>,

    /// Container (defaults to the pod's default container)
    #[arg(short = 'c', long = "container", default_value = "")]
    pub container: String,

    /// Pod name
    pub pod: String,

    /// Command and arguments to run
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

impl Cli {
    /// Options file values, overridden by explicit flags
    pub fn kubectl_options(&self) -> Result<KubectlOptions, ConfigError> {
        let mut options = match &self.options {
            Some(path) => KubectlOptions::load_from(path)?,
            None => KubectlOptions::default(),
        };

        if let Some(path) = &self.kubeconfig {
            options.config_path = Some(path.clone());
        }
        if let Some(context) = &self.context {
            options.context_name = Some(context.clone());
        }
        if let Some(namespace) = &self.namespace {
            options.namespace = Some(namespace.clone());
        }

        Ok(options)
    }
}

/// Exit status for this process given the remote exit code
pub fn process_exit_code(code: i32) -> u8 {
    if code < 0 {
        1
    } else {
        u8::try_from(code).unwrap_or(u8::MAX)
    }
}
