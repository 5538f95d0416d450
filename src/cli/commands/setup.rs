//! This module defines the `setup` subcommand.
//!
//! The `setup` subcommand resolves repository view artifacts, merges the
//! views they carry and writes the resulting repository configuration,
//! together with a record of the view artifacts used, into a directory.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use artifact::setup::{CONFIGURATION_FILE, SetupOptions, setup_repository_configuration};
use artifact::{AbortSignal, Dependency};
use clap::Parser;
use depot_config::CONFIG;

use crate::cli::RepositoryArgs;

/// The `setup` subcommand.
#[derive(Parser, Debug)]
#[command(arg_required_else_help = true, next_help_heading = "Setup Options")]
pub(in super::super) struct Args {
    /// The view artifacts, e.g. `com.acme:views#1.0`
    #[arg(required = true)]
    coordinates: Vec<Dependency>,

    /// The directory the configuration is written to
    #[arg(long, short, value_name = "DIR")]
    output: PathBuf,

    /// Merge the views in development mode
    #[arg(long, short)]
    development: bool,

    #[command(flatten)]
    repositories: RepositoryArgs,
}

/// The main entry point for the `setup` subcommand.
pub(super) fn run(args: Args, abort: AbortSignal) -> Result<()> {
    let resolver = args.repositories.resolver()?;
    let setup = setup_repository_configuration(&resolver, &args.coordinates, &SetupOptions {
        development_mode: args.development,
        abort,
        contention_wait: Duration::from_secs(CONFIG.enrichment.contention_wait_secs),
    })?;
    setup.write(&args.output)?;

    for solution in &setup.view_resolution.solutions {
        tracing::debug!(artifact = %solution.artifact, "used view artifact");
    }
    println!("{}", args.output.join(CONFIGURATION_FILE).display());
    Ok(())
}
