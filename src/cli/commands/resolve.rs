//! This module defines the `resolve` subcommand.
//!
//! The `resolve` subcommand resolves dependency coordinates against the
//! configured repositories and prints either the dependency tree or, with
//! `--scope`, a classpath. `--json` prints a machine readable report instead.

use anyhow::{Result, bail};
use artifact::clash::{self, ClashStrategy, DependencyClash};
use artifact::enrich::PartEnrichingContext;
use artifact::resolution::Part;
use artifact::resolve::{
    ClasspathContext, ClasspathResolver, ClasspathScope, ResolutionContext, TerminalSpec,
};
use artifact::{AbortSignal, AnalysisArtifactResolution, Dependency, PartKey, Reason};
use clap::Parser;
use depot_config::CONFIG;
use serde::Serialize;

use crate::cli::RepositoryArgs;

//================================================================================================
// Types
//================================================================================================

/// The `resolve` subcommand.
#[derive(Parser, Debug)]
#[command(arg_required_else_help = true, next_help_heading = "Resolve Options")]
pub(in super::super) struct Args {
    /// The dependencies to resolve, e.g. `com.acme:app#[1.0,2.0)`
    #[arg(required = true)]
    coordinates: Vec<Dependency>,

    /// Build the classpath of the given scope (compile, runtime or test)
    #[arg(long, short)]
    scope: Option<ClasspathScope>,

    /// How version clashes are decided (highest-version or nearest-path)
    ///
    /// Classpaths always decide clashes, using the configured strategy when
    /// none is given. Plain resolutions only do when a strategy is given.
    #[arg(long)]
    strategy: Option<ClashStrategy>,

    /// Parts to fetch for every solution, e.g. `jar` or `sources:jar`
    #[arg(long, short, value_delimiter = ',')]
    parts: Vec<PartKey>,

    /// Fail on the first problem instead of reporting all of them
    #[arg(long)]
    strict: bool,

    /// Print a JSON report instead of a tree
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    repositories: RepositoryArgs,
}

#[derive(Serialize)]
struct Report<'a> {
    terminals: Vec<String>,
    solutions: Vec<SolutionReport>,
    clashes: &'a [DependencyClash],
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<&'a Reason>,
}

#[derive(Serialize)]
struct SolutionReport {
    artifact: String,
    packaging: String,
    parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<Reason>,
}

//================================================================================================
// Functions
//================================================================================================

/// The main entry point for the `resolve` subcommand.
pub(super) fn run(args: Args, abort: AbortSignal) -> Result<()> {
    let resolver = args.repositories.resolver()?;
    let terminals: Vec<TerminalSpec> = args
        .coordinates
        .iter()
        .cloned()
        .map(TerminalSpec::Dependency)
        .collect();
    let lenient = !args.strict && CONFIG.resolution.lenient;

    let resolution = match args.scope {
        Some(scope) => {
            let context = ClasspathContext {
                scope,
                strategy: args
                    .strategy
                    .unwrap_or_else(|| CONFIG.resolution.clash_strategy.into()),
                lenient,
                enrich_sources: args.parts.contains(&PartKey::sources()),
                enrich_docs: args.parts.contains(&PartKey::docs()),
                abort,
                ..Default::default()
            };
            ClasspathResolver::new(resolver).resolve(&context, &terminals)?
        },
        None => {
            let mut builder = ResolutionContext::builder()
                .lenient(lenient)
                .abort(abort);
            if !args.parts.is_empty() {
                builder = builder.enrich(PartEnrichingContext::new("resolve", args.parts.clone()));
            }
            let mut resolution = resolver.resolve(builder.build(), &terminals)?;
            if let Some(strategy) = args.strategy {
                clash::resolve_clashes(&mut resolution, strategy, lenient)?;
            }
            resolution
        },
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report(&resolution))?);
    } else {
        print_text(&resolution, args.scope.is_some());
    }

    if let Some(failure) = resolution.failure() {
        tracing::error!(
            message = "resolution has failures",
            unresolved = resolution.unresolved().len()
        );
        eprint!("{}", failure.render());
        bail!("{failure}");
    }
    Ok(())
}

fn print_text(resolution: &AnalysisArtifactResolution, classpath: bool) {
    if !classpath {
        print!("{}", resolution.render(false));
    } else {
        for solution in resolution.solutions() {
            match solution.solution().part(&PartKey::binary()) {
                Some(part) => println!("{}", part.location.display()),
                None => println!("{}", solution.id),
            }
        }
    }
    for clash in resolution.clashes() {
        tracing::info!(
            message = "clash",
            artifact = %clash.artifact,
            winner = %clash.winner,
            losers = clash.losers.len()
        );
    }
}

fn report(resolution: &AnalysisArtifactResolution) -> Report<'_> {
    Report {
        terminals: resolution
            .terminal_artifacts()
            .into_iter()
            .map(|key| resolution.artifact(key).id.to_string())
            .collect(),
        solutions: resolution
            .solutions()
            .map(|solution| SolutionReport {
                artifact: solution.id.to_string(),
                packaging: solution.packaging.clone(),
                parts: solution.solution().parts(),
                failure: solution.failure.clone(),
            })
            .collect(),
        clashes: resolution.clashes(),
        failure: resolution.failure(),
    }
}
