pub mod config;
pub mod kubernetes;
pub mod logger;

pub use config::{ConfigError, KubectlOptions};
pub use kubernetes::{exec, exec_e, CommandOutput, ExecError, ExecFailure, PodCommand};
pub use logger::{LogLevel, Logger, RecordingLogger, TracingLogger};
