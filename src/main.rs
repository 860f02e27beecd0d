mod cli;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{process_exit_code, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging; stdout carries the remote command's output
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let options = match cli.kubectl_options() {
        Ok(options) => options,
        Err(e) => {
            tracing::error!("Failed to load options: {}", e);
            eprintln!("podexec: {}", e);
            return ExitCode::from(1);
        }
    };

    match podexec::exec_e(&options, &cli.pod, &cli.container, &cli.command).await {
        Ok(output) => {
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            ExitCode::SUCCESS
        }
        Err(failure) => {
            print!("{}", failure.output.stdout);
            eprint!("{}", failure.output.stderr);

            match failure.error.exit_code() {
                Some(code) => ExitCode::from(process_exit_code(code)),
                None => {
                    eprintln!("podexec: {}", failure.error);
                    ExitCode::from(1)
                }
            }
        }
    }
}
