#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

use clap::Parser;
use otel_rollout::{Cli, Config};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Exit code for failures before a run starts.
const EXIT_SETUP_FAILURE: u8 = 2;

fn log_level(cli: &Cli) -> Level {
    if cli.quiet {
        return Level::WARN;
    }
    match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so `--output json` stays machine-readable.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(&cli))
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: failed to install log subscriber: {e}");
    }

    let result = match Config::load(cli.config.as_deref()) {
        Ok(config) => otel_rollout::app::dispatch::dispatch(cli, config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_SETUP_FAILURE)
        }
    }
}
