//! # Repository Setup
//!
//! Builds a [`RepositoryConfiguration`] from artifacts carrying repository
//! views. The view artifacts are resolved transitively with their parents
//! and imports, their `repositoryview:toml` parts are fetched, and the views
//! found are merged in solution order, so that a view always comes after the
//! views it depends on.
//!
//! A view artifact another process is enriching at the same time is waited
//! for: its view is fetched again once the lock is released. When the lock
//! outlives [`SetupOptions::contention_wait`] the setup fails rather than
//! leaving the view out.
//!
//! Next to the configuration the setup reports a
//! [`RepositoryViewResolution`] describing which view artifacts took part
//! and how they depend on each other.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::AbortSignal;
use crate::enrich::{PartEnrichingContext, WantedParts};
use crate::id::{Dependency, PartKey};
use crate::merge::{MergeError, MergeOptions, merge_views};
use crate::model::{AtomicWriteError, write_atomic};
use crate::reason::{Reason, ReasonKind};
use crate::repository::{ConfigurationError, RepositoryConfiguration, RepositoryView};
use crate::resolution::{AnalysisArtifactResolution, ArtifactKey, EdgeKind};
use crate::resolve::{ResolutionContext, ResolveError, TerminalSpec, TransitiveResolver};

/// File name of the merged configuration written by [`RepositorySetup::write`].
pub const CONFIGURATION_FILE: &str = "repository-configuration.toml";
/// File name of the view resolution written by [`RepositorySetup::write`].
pub const VIEW_RESOLUTION_FILE: &str = "repository-view-resolution.toml";

/// Walk scope of the view enrichment, passed to listeners.
const WALK_SCOPE: &str = "repository-setup";
/// Pause between two tries on a contended view artifact.
const CONTENTION_POLL: Duration = Duration::from_millis(100);

//================================================================================================
// Types
//================================================================================================

/// Options of [`setup_repository_configuration`].
#[derive(Clone, Debug)]
pub struct SetupOptions {
    /// Merge the views in development mode.
    pub development_mode: bool,
    /// Cancels the resolution of the view artifacts.
    pub abort: AbortSignal,
    /// How long to wait for view artifacts locked by someone else.
    pub contention_wait: Duration,
}

/// The outcome of a setup.
#[derive(Clone, Debug)]
pub struct RepositorySetup {
    /// The merged configuration.
    pub configuration: RepositoryConfiguration,
    /// The view artifacts that took part.
    pub view_resolution: RepositoryViewResolution,
}

/// The view artifacts of a setup.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RepositoryViewResolution {
    /// The resolved terminals.
    pub terminals: Vec<String>,
    /// Every view artifact in merge order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub solutions: Vec<RepositoryViewSolution>,
}

/// One view artifact.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RepositoryViewSolution {
    /// The artifact's coordinate.
    pub artifact: String,
    /// The view artifacts it depends on or imports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// Errors of a setup.
#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    /// The view artifacts did not resolve.
    #[error("failed to resolve the repository views")]
    Resolve(#[from] ResolveError),
    /// The views could not be merged.
    #[error(transparent)]
    Merge(#[from] MergeError),
    /// A view part could not be read.
    #[error("failed to read the repository view of {artifact}")]
    Read {
        /// The view artifact.
        artifact: String,
        /// The underlying failure.
        #[source]
        source: ConfigurationError,
    },
    /// A result file could not be written.
    #[error("failed to write `{path}`")]
    Write {
        /// The file.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// View artifacts stayed locked by someone else for too long.
    #[error("repository views of {} are still being fetched elsewhere", .artifacts.join(", "))]
    Contended {
        /// The locked view artifacts.
        artifacts: Vec<String>,
    },
    /// The configuration could not be serialized.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// The view resolution could not be serialized.
    #[error(transparent)]
    Serialize(#[from] toml_edit::ser::Error),
}

//================================================================================================
// Impls
//================================================================================================

impl SetupError {
    /// The error as a [`Reason`].
    pub fn reason(&self) -> Reason {
        match self {
            SetupError::Resolve(e) => e.reason(),
            SetupError::Merge(e) => e.reason(),
            SetupError::Contended { .. } => {
                Reason::new(ReasonKind::EnrichingFailure, self.to_string())
            },
            other => Reason::new(ReasonKind::ConfigurationFailure, other.to_string()),
        }
    }
}

impl Default for SetupOptions {
    fn default() -> Self {
        let wait = depot_config::Config::default().enrichment.contention_wait_secs;
        Self {
            development_mode: false,
            abort: AbortSignal::default(),
            contention_wait: Duration::from_secs(wait),
        }
    }
}

impl RepositorySetup {
    /// Writes the configuration and the view resolution into `dir`, each
    /// file atomically.
    pub fn write(&self, dir: &Path) -> Result<(), SetupError> {
        let configuration = dir.join(CONFIGURATION_FILE);
        write_file(&configuration, &self.configuration.to_toml()?)?;

        let resolution = dir.join(VIEW_RESOLUTION_FILE);
        write_file(
            &resolution,
            &toml_edit::ser::to_string_pretty(&self.view_resolution)?,
        )?;
        tracing::info!(
            message = "wrote repository setup",
            dir = %dir.display(),
            repositories = self.configuration.repositories.len()
        );
        Ok(())
    }
}

impl RepositoryViewResolution {
    /// Describes the view artifacts of `resolution`.
    pub fn of(resolution: &AnalysisArtifactResolution) -> Self {
        let terminals = resolution
            .terminal_artifacts()
            .into_iter()
            .map(|key| resolution.artifact(key).id.to_string())
            .collect();

        let solutions = resolution
            .solutions()
            .map(|artifact| RepositoryViewSolution {
                artifact: artifact.id.to_string(),
                dependencies: artifact
                    .imports
                    .iter()
                    .chain(artifact.dependencies.iter())
                    .map(|key| resolution.dependency(*key))
                    .filter(|d| d.kind != EdgeKind::Parent)
                    .filter_map(|d| d.solution)
                    .map(|key| resolution.artifact(key).id.to_string())
                    .collect(),
            })
            .collect();

        Self {
            terminals,
            solutions,
        }
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Resolves the view artifacts `terminals`, merges their views and returns
/// the resulting configuration.
///
/// The resolution is strict: a view artifact that cannot be resolved or
/// enriched fails the setup. Solutions without a view part are skipped.
/// Solutions locked by someone else are retried until the lock is released
/// or [`SetupOptions::contention_wait`] has passed.
pub fn setup_repository_configuration(
    resolver: &TransitiveResolver,
    terminals: &[Dependency],
    options: &SetupOptions,
) -> Result<RepositorySetup, SetupError> {
    let context = ResolutionContext::builder()
        .include_parent(true)
        .include_imports(true)
        .lenient(false)
        .abort(options.abort.clone())
        .enrich(PartEnrichingContext::new(WALK_SCOPE, vec![
            PartKey::repository_view(),
        ]))
        .build();
    let specs: Vec<TerminalSpec> = terminals
        .iter()
        .cloned()
        .map(TerminalSpec::Dependency)
        .collect();
    let mut resolution = resolver.resolve(context, &specs)?;
    if let Some(failure) = resolution.failure() {
        return Err(ResolveError::Incomplete(failure.clone()).into());
    }
    await_contended(resolver, &mut resolution, options)?;

    let mut views = Vec::new();
    for artifact in resolution.solutions() {
        let Some(part) = artifact.solution().part(&PartKey::repository_view()) else {
            tracing::debug!(artifact.id = %artifact.id, "artifact carries no repository view");
            continue;
        };
        let mut view = RepositoryView::read(&part.location).map_err(|source| SetupError::Read {
            artifact: artifact.id.to_string(),
            source,
        })?;
        view.origin = Some(artifact.id.clone());
        views.push(view);
    }

    let configuration = merge_views(&views, &MergeOptions {
        development_mode: options.development_mode,
    })?;
    tracing::info!(
        message = "merged repository views",
        views = views.len(),
        repositories = configuration.repositories.len()
    );

    Ok(RepositorySetup {
        configuration,
        view_resolution: RepositoryViewResolution::of(&resolution),
    })
}

/// Fetches the views of contended solutions again until none is left.
fn await_contended(
    resolver: &TransitiveResolver,
    resolution: &mut AnalysisArtifactResolution,
    options: &SetupOptions,
) -> Result<(), SetupError> {
    let deadline = Instant::now() + options.contention_wait;
    while !resolution.contended().is_empty() {
        let now = Instant::now();
        if now >= deadline {
            let artifacts = resolution
                .contended()
                .iter()
                .map(|key| resolution.artifact(*key).id.to_string())
                .collect();
            return Err(SetupError::Contended { artifacts });
        }
        tracing::debug!(
            contended = resolution.contended().len(),
            "waiting for locked repository views"
        );
        std::thread::sleep(CONTENTION_POLL.min(deadline - now));

        let retry: HashSet<ArtifactKey> = resolution.contended().iter().copied().collect();
        resolver.enrich_with(resolution, WALK_SCOPE, &options.abort, |_, key| {
            retry
                .contains(&key)
                .then(|| WantedParts::from(vec![PartKey::repository_view()]))
        })?;
        if let Some(failure) = resolution.failure() {
            return Err(ResolveError::Incomplete(failure.clone()).into());
        }
    }
    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<(), SetupError> {
    write_atomic(path, content.as_bytes()).map_err(|e| SetupError::Write {
        path: path.to_owned(),
        source: match e {
            AtomicWriteError::Io(source) => source,
            AtomicWriteError::Persist(p) => p.error,
        },
    })
}
