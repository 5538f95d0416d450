//! The main entry point for the Depot CLI.

#![warn(missing_docs)]

use std::process::ExitCode;

use artifact::AbortSignal;
use clap::Parser;
use depot::cli::{self, Args};

//================================================================================================
// Functions
//================================================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = cli::init_global_subscriber(args.log);
    let abort = AbortSignal::new();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Ctrl+C received, terminating...");
            abort.abort();
            ExitCode::FAILURE
        }
        res = cli::run(args, abort.clone()) => {
            if let Err(e) = res {
                depot::fatal!(format!("{e:#}"));
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    }
}
