//! Command line interface of the `depot` binary.
mod commands;
pub mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use artifact::enrich::{PartEnricher, TracingListener};
use artifact::lock::SolutionLocks;
use artifact::reflection::ConfiguredReflection;
use artifact::repository::RepositoryConfiguration;
use artifact::resolve::TransitiveResolver;
use clap::Parser;
pub use commands::run;
use depot_config::CONFIG;
pub use logging::init_global_subscriber;

/// Command line arguments of `depot`.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Change the current working directory
    ///
    /// If specified, changes the current working directory to the given
    /// path before executing any commands. Relative paths given to the
    /// subcommands are taken relative to it.
    #[arg(short = 'C', value_name = "DIR", global = true, value_parser = validate_path)]
    working_directory: Option<PathBuf>,

    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    command: commands::Commands,
}

/// Verbosity flags shared by every subcommand.
#[derive(Parser, Clone, Copy, Debug)]
#[command(next_help_heading = "Log Options")]
pub struct LogArgs {
    /// Set the level of verbosity
    ///
    /// This flag can be used multiple times to increase verbosity:
    /// 1. -v    for DEBUG level
    /// 2. -vv   for TRACE level
    ///
    /// If not specified, defaults to INFO level.
    ///
    /// Alternatively, set the `RUST_LOG` environment variable (e.g., `RUST_LOG=info`), which takes
    /// precedence over this flag.
    ///
    /// **Note**: This flag is silently ignored when `--quiet` is also set.
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase logging verbosity",
    )]
    verbosity: u8,

    /// Suppress verbosity (*takes precedent*)
    ///
    /// This flag can be used multiple times to decrease verbosity:
    /// 1. -q    for WARN level
    /// 2. -qq   for ERROR level
    ///
    /// This flag *overrides* any verbosity settings. It takes precedence over both the
    /// `--verbosity` flag and the `RUST_LOG` environment variable.
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
    )]
    quiet: u8,
}

/// Where artifacts are looked up.
#[derive(Parser, Clone, Debug)]
#[command(next_help_heading = "Repository Options")]
pub(crate) struct RepositoryArgs {
    /// The repository configuration to resolve against
    ///
    /// Defaults to the `repository_configuration` setting of the depot
    /// configuration. Without either, only the local repository is used.
    #[arg(long, short = 'r', value_name = "FILE")]
    repositories: Option<PathBuf>,

    /// Root of the local repository parts are stored in
    #[arg(long, value_name = "DIR")]
    local_repository: Option<PathBuf>,

    /// Only use what is already in the local repository
    #[arg(long)]
    offline: bool,
}

impl RepositoryArgs {
    fn configuration(&self) -> anyhow::Result<RepositoryConfiguration> {
        let path = self
            .repositories
            .as_ref()
            .or(CONFIG.repository_configuration.as_ref());
        let mut configuration = match path {
            Some(path) => RepositoryConfiguration::read(path)
                .with_context(|| format!("loading `{}`", path.display()))?,
            None => {
                tracing::warn!("no repository configuration given, using the local repository only");
                RepositoryConfiguration::default()
            },
        };
        configuration.offline |= self.offline;
        Ok(configuration)
    }

    /// A resolver over the configured repositories, enriching with the
    /// configured worker count.
    pub(crate) fn resolver(&self) -> anyhow::Result<TransitiveResolver> {
        let locks = Arc::new(SolutionLocks::new(Duration::from_secs(
            CONFIG.enrichment.stale_lock_secs,
        )));
        let configuration = self.configuration()?;
        let local = self
            .local_repository
            .clone()
            .or_else(|| configuration.local_repository_path.clone())
            .unwrap_or_else(|| CONFIG.local_repository.clone());

        let reflection = Arc::new(
            ConfiguredReflection::builder(configuration)
                .local_repository(local)
                .locks(Arc::clone(&locks))
                .build()?,
        );
        let enricher = PartEnricher::new(reflection.clone())
            .with_locks(locks)
            .with_listener(Arc::new(TracingListener));
        Ok(TransitiveResolver::new(reflection).with_enricher(Arc::new(enricher), CONFIG.workers()))
    }
}

fn validate_path(path: &str) -> Result<PathBuf, std::io::Error> {
    std::fs::canonicalize(path)
}

#[cfg(test)]
mod test;
