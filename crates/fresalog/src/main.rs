//! Fresalog launcher.

use clap::Parser;
use fresalog_logging::{init_logging, LogConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = fresalog::cli::Cli::parse();

    if let Err(e) = init_logging(LogConfig {
        app_name: "fresalog",
        verbose: cli.verbose(),
    }) {
        eprintln!("warning: failed to initialize logging: {e:#}");
    }

    match fresalog::cli::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
