mod merge;
mod resolve;
mod setup;

use anyhow::Context;
use artifact::AbortSignal;
use clap::Subcommand;

use super::Args;

#[derive(Subcommand)]
pub(super) enum Commands {
    /// Resolve artifacts and their transitive dependencies.
    ///
    /// Each coordinate is a dependency such as `com.acme:app#1.0` or
    /// `com.acme:app#[1.0,2.0)`. Without `--scope` the whole dependency
    /// graph is printed; with it, a classpath of exactly one version per
    /// artifact is computed and its binaries are fetched.
    #[command(verbatim_doc_comment)]
    Resolve(resolve::Args),
    /// Merge repository view files into one repository configuration.
    ///
    /// Views are merged in the order given: later views add to and refine
    /// what earlier ones declared.
    #[command(verbatim_doc_comment)]
    Merge(merge::Args),
    /// Set up a repository configuration from repository view artifacts.
    ///
    /// The view artifacts are resolved with their dependencies, their views
    /// fetched and merged, and the result is written to the given directory.
    #[command(verbatim_doc_comment)]
    Setup(setup::Args),
}

/// Runs the parsed command line. Resolution is blocking and runs off the
/// async runtime; `abort` is handed down to it.
pub async fn run(args: Args, abort: AbortSignal) -> anyhow::Result<()> {
    if let Some(dir) = &args.working_directory {
        std::env::set_current_dir(dir)
            .with_context(|| format!("changing into `{}`", dir.display()))?;
    }

    let task = tokio::task::spawn_blocking(move || match args.command {
        Commands::Resolve(args) => resolve::run(args, abort),
        Commands::Merge(args) => merge::run(args),
        Commands::Setup(args) => setup::run(args, abort),
    });
    task.await?
}
