//! Attache - personal assistant relay.
//!
//! This is the main entry point.

use clap::Parser;
use std::process::ExitCode;

use attache::cli::Commands;
use attache::logging;

#[tokio::main]
async fn main() -> ExitCode {
    // The guard flushes the file appender on drop; keep it for the
    // process lifetime.
    let _guard = match logging::init() {
        Ok((guard, _log_path)) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let args = Commands::parse();

    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
