mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    install_logging(&cli.global);

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let status = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(status)
        }
    }
}

/// `RUST_LOG` wins; otherwise `-q` and `-v` pick the level. Logs always
/// go to stderr so stdout stays parseable.
fn install_logging(global: &cli::GlobalOpts) {
    let level = if global.quiet {
        "error"
    } else {
        match global.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn execute(cli: Cli) -> Result<(), CliError> {
    let Cli { global, command } = cli;
    if let Command::Config(ref config) = command {
        // Purely local; no client needed.
        return commands::config_cmd::handle(config, &global);
    }
    tracing::debug!(?command, "running");
    commands::dispatch(command, &global).await
}
