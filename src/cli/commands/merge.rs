//! This module defines the `merge` subcommand.
//!
//! Repository view files are read in the order given, merged into one
//! repository configuration and printed, or written when `--output` is set.

use std::path::PathBuf;

use anyhow::{Context, Result};
use artifact::merge::{MergeOptions, merge_views};
use artifact::repository::RepositoryView;
use clap::Parser;

/// The `merge` subcommand.
#[derive(Parser, Debug)]
#[command(arg_required_else_help = true, next_help_heading = "Merge Options")]
pub(in super::super) struct Args {
    /// The repository view files, oldest first
    #[arg(required = true)]
    views: Vec<PathBuf>,

    /// Wrap every artifact filter into a development view
    #[arg(long, short)]
    development: bool,

    /// Write the configuration to this file instead of printing it
    #[arg(long, short, value_name = "FILE")]
    output: Option<PathBuf>,
}

/// The main entry point for the `merge` subcommand.
pub(super) fn run(args: Args) -> Result<()> {
    let views = args
        .views
        .iter()
        .map(|path| {
            RepositoryView::read(path).with_context(|| format!("reading `{}`", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let configuration = merge_views(&views, &MergeOptions {
        development_mode: args.development,
    })?;

    match &args.output {
        Some(path) => {
            configuration.write(path)?;
            tracing::info!(
                message = "wrote repository configuration",
                path = %path.display(),
                repositories = configuration.repositories.len()
            );
        },
        None => print!("{}", configuration.to_toml()?),
    }
    Ok(())
}
