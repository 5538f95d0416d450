//! # Repository Reflection
//!
//! Answers questions about the configured repositories: which version
//! satisfies a dependency, what an artifact's descriptor says, which parts a
//! version has and where a part can be downloaded from.
//!
//! ## Architecture
//!
//! [`RepositoryReflection`] is the seam the resolver and the enricher consume.
//! [`ConfiguredReflection`] implements it on top of a
//! [`RepositoryConfiguration`] and a [`Transport`], the primitive that moves
//! bytes. Repositories are consulted in configuration order; a repository
//! takes part in a lookup when it is online, serves the version's role
//! (release or snapshot) and its artifact filter admits the subject.
//!
//! Descriptors are cached in the local repository: a fetched descriptor is
//! staged as a temporary file and only renamed into the solution directory
//! when the solution lock can be taken. Parsed descriptors are memoized in a
//! [`DescriptorCache`] owned by the caller and shared for one invocation.

pub mod layout;
mod transport;

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use depot_version::Version;
use tempfile::NamedTempFile;

pub use self::transport::{FileSystemTransport, Transport, TransportError};
use crate::id::{
    ArtifactIdentification, DependencyIdentification, PartKey, VersionedArtifactIdentification,
};
use crate::lock::SolutionLocks;
use crate::model::{self, ArtifactModel};
use crate::reason::{Reason, ReasonKind};
use crate::repository::{Repository, RepositoryConfiguration, RepositoryRole};

/// A value or the reason it could not be obtained.
pub type Maybe<T> = Result<T, Reason>;

//================================================================================================
// Types
//================================================================================================

/// Repository access as seen by the resolver and the enricher.
pub trait RepositoryReflection: Send + Sync {
    /// Picks the highest visible version satisfying `dependency`.
    fn resolve_dependency(
        &self,
        dependency: &DependencyIdentification,
    ) -> Maybe<VersionedArtifactIdentification>;

    /// Reads the descriptor of `artifact`.
    fn resolve_artifact(&self, artifact: &VersionedArtifactIdentification)
    -> Maybe<Arc<ArtifactModel>>;

    /// Lists the parts available for `artifact` across all repositories.
    fn list_available_parts(
        &self,
        artifact: &VersionedArtifactIdentification,
    ) -> Result<Vec<PartKey>, ReflectionError>;

    /// Downloads `part` into `target`, returning the name of the repository
    /// that served it, or `None` when no repository has it.
    fn download_part(
        &self,
        artifact: &VersionedArtifactIdentification,
        part: &PartKey,
        target: &Path,
    ) -> Result<Option<String>, ReflectionError>;

    /// Looks up a configured repository by name.
    fn repository(&self, name: &str) -> Option<&Repository>;

    /// Root of the local repository parts are stored in.
    fn local_repository(&self) -> &Path;
}

/// Errors raised by [`RepositoryReflection`] operations that are not
/// expressed as [`Reason`]s.
#[derive(thiserror::Error, Debug)]
pub enum ReflectionError {
    /// A repository failed to answer.
    #[error("repository `{repository}` failed")]
    Transport {
        /// The failing repository.
        repository: String,
        /// The underlying failure.
        #[source]
        source: TransportError,
    },
    /// No repository can enumerate the parts of the artifact.
    #[error("no repository can list the parts of {0}")]
    Unlistable(VersionedArtifactIdentification),
    /// The repository configuration is unusable.
    #[error("repository configuration failed: {0}")]
    Configuration(Reason),
}

/// Parsed descriptors of one invocation, keyed by coordinate.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: Mutex<HashMap<VersionedArtifactIdentification, CachedDescriptor>>,
}

#[derive(Clone, Debug)]
struct CachedDescriptor {
    model: Arc<ArtifactModel>,
    repository: Option<String>,
}

/// A [`RepositoryReflection`] over a [`RepositoryConfiguration`].
pub struct ConfiguredReflection {
    configuration: RepositoryConfiguration,
    transport: Arc<dyn Transport>,
    local_root: PathBuf,
    local: Repository,
    locks: Arc<SolutionLocks>,
    descriptors: Arc<DescriptorCache>,
}

/// Builder for [`ConfiguredReflection`].
pub struct ConfiguredReflectionBuilder {
    configuration: RepositoryConfiguration,
    transport: Arc<dyn Transport>,
    local_root: Option<PathBuf>,
    locks: Option<Arc<SolutionLocks>>,
    descriptors: Option<Arc<DescriptorCache>>,
}

/// Errors that can occur while building a [`ConfiguredReflection`].
#[derive(thiserror::Error, Debug)]
pub enum SetupReflectionError {
    /// The local repository could not be created.
    #[error("local repository `{path}` is unusable: {source}")]
    LocalRepository {
        /// The root.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },
}

//================================================================================================
// Impls
//================================================================================================

impl DescriptorCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, id: &VersionedArtifactIdentification) -> Option<CachedDescriptor> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn insert(&self, id: VersionedArtifactIdentification, entry: CachedDescriptor) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, entry);
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing was cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConfiguredReflectionBuilder {
    /// Sets the transport used to talk to repositories.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Overrides the local repository root.
    pub fn local_repository(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_root = Some(root.into());
        self
    }

    /// Shares a lock registry, e.g. with a [`crate::enrich::PartEnricher`].
    pub fn locks(mut self, locks: Arc<SolutionLocks>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Shares a descriptor cache.
    pub fn descriptor_cache(mut self, cache: Arc<DescriptorCache>) -> Self {
        self.descriptors = Some(cache);
        self
    }

    /// Finishes the reflection, creating the local repository root.
    pub fn build(self) -> Result<ConfiguredReflection, SetupReflectionError> {
        let local_root = self
            .local_root
            .or_else(|| self.configuration.local_repository_path.clone())
            .unwrap_or_else(|| depot_config::Config::default().local_repository);
        std::fs::create_dir_all(&local_root).map_err(|source| {
            SetupReflectionError::LocalRepository {
                path: local_root.clone(),
                source,
            }
        })?;

        if let Some(failure) = &self.configuration.failure {
            tracing::warn!(
                message = "repository configuration carries a failure",
                failure = %failure
            );
        }

        Ok(ConfiguredReflection {
            local: Repository::local("local", &local_root),
            local_root,
            configuration: self.configuration,
            transport: self.transport,
            locks: self.locks.unwrap_or_default(),
            descriptors: self.descriptors.unwrap_or_default(),
        })
    }
}

impl ConfiguredReflection {
    /// Starts building a reflection over `configuration` with a
    /// [`FileSystemTransport`].
    pub fn builder(configuration: RepositoryConfiguration) -> ConfiguredReflectionBuilder {
        ConfiguredReflectionBuilder {
            configuration,
            transport: Arc::new(FileSystemTransport),
            local_root: None,
            locks: None,
            descriptors: None,
        }
    }

    /// The configuration reflected on.
    pub fn configuration(&self) -> &RepositoryConfiguration {
        &self.configuration
    }

    /// The lock registry used when caching descriptors.
    pub fn locks(&self) -> &Arc<SolutionLocks> {
        &self.locks
    }

    /// The repository the descriptor of `artifact` was fetched from, `None`
    /// when it was not fetched or came from the local repository.
    pub fn descriptor_origin(&self, artifact: &VersionedArtifactIdentification) -> Option<String> {
        self.descriptors.get(artifact).and_then(|c| c.repository)
    }

    fn check_configuration(&self) -> Maybe<()> {
        match &self.configuration.failure {
            Some(failure) => Err(Reason::new(
                ReasonKind::ConfigurationFailure,
                "repository configuration is invalid",
            )
            .caused_by(failure.clone())),
            None => Ok(()),
        }
    }

    /// Repositories that may be contacted at all.
    fn online(&self) -> impl Iterator<Item = &Repository> {
        let offline = self.configuration.offline;
        self.configuration
            .repositories
            .iter()
            .filter(move |r| !offline && !r.is_offline())
    }

    /// Repositories that may serve `artifact` at version level.
    fn serving<'a>(
        &'a self,
        artifact: &'a VersionedArtifactIdentification,
    ) -> impl Iterator<Item = &'a Repository> + 'a {
        let role = RepositoryRole::of(&artifact.version);
        self.online().filter(move |r| {
            r.serves(role)
                && r.artifact_filter
                    .as_ref()
                    .is_none_or(|f| f.matches_version(artifact))
        })
    }

    fn admits(repository: &Repository, artifact: &ArtifactIdentification) -> bool {
        repository
            .artifact_filter
            .as_ref()
            .is_none_or(|f| f.matches_artifact(artifact))
    }

    fn visible(&self, repository: &Repository, version: &VersionedArtifactIdentification) -> bool {
        repository.serves(RepositoryRole::of(&version.version))
            && repository
                .artifact_filter
                .as_ref()
                .is_none_or(|f| f.matches_version(version))
    }

    fn unresolved(dependency: &DependencyIdentification) -> Reason {
        Reason::new(
            ReasonKind::UnresolvedDependency,
            format!("no version of {dependency} found in any repository"),
        )
    }

    fn read_local_descriptor(
        &self,
        artifact: &VersionedArtifactIdentification,
    ) -> Maybe<Option<Arc<ArtifactModel>>> {
        let path = layout::part_path(&self.local_root, artifact, &PartKey::descriptor());
        if !path.is_file() {
            return Ok(None);
        }
        let model = model::read_artifact_descriptor(&path).map_err(|e| {
            Reason::new(
                ReasonKind::InvalidArtifact,
                format!("descriptor of {artifact} is unreadable"),
            )
            .caused_by(Reason::from_error(&e))
        })?;
        Ok(Some(Arc::new(model)))
    }

    fn fetch_descriptor(
        &self,
        artifact: &VersionedArtifactIdentification,
    ) -> Maybe<(Arc<ArtifactModel>, String)> {
        let part = PartKey::descriptor();
        let mut failure = Reason::new(
            ReasonKind::UnresolvedArtifact,
            format!("no descriptor of {artifact} found in any repository"),
        );

        for repository in self.serving(artifact) {
            if !repository
                .artifact_filter
                .as_ref()
                .is_none_or(|f| f.matches_part(artifact, &part))
            {
                continue;
            }

            let staged = NamedTempFile::with_prefix_in(".depot-", &self.local_root)
                .map_err(|e| Reason::from_error(&e))?;
            match self
                .transport
                .fetch(repository, artifact, &part, staged.path())
            {
                Ok(false) => continue,
                Ok(true) => {},
                Err(e) => {
                    tracing::warn!(
                        message = "repository failed to serve descriptor",
                        repository = %repository.name,
                        artifact.id = %artifact,
                        error = %e
                    );
                    failure.push(
                        Reason::new(
                            ReasonKind::Io,
                            format!("repository `{}` failed", repository.name),
                        )
                        .caused_by(Reason::from_error(&e)),
                    );
                    continue;
                },
            }

            let model = model::read_artifact_descriptor(staged.path()).map_err(|e| {
                Reason::new(
                    ReasonKind::InvalidArtifact,
                    format!(
                        "descriptor of {artifact} from `{}` is unreadable",
                        repository.name
                    ),
                )
                .caused_by(Reason::from_error(&e))
            })?;
            self.persist_descriptor(artifact, staged);
            return Ok((Arc::new(model), repository.name.clone()));
        }
        Err(failure)
    }

    /// Moves a staged descriptor into the local repository if the solution
    /// is not being written by someone else. A failure only costs the cache.
    fn persist_descriptor(&self, artifact: &VersionedArtifactIdentification, staged: NamedTempFile) {
        let dir = layout::solution_dir(&self.local_root, artifact);
        let lock = match self.locks.try_acquire(&dir) {
            Ok(Some(lock)) => lock,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(artifact.id = %artifact, error = %e, "descriptor not cached");
                return;
            },
        };
        let target = layout::part_path(&self.local_root, artifact, &PartKey::descriptor());
        if let Err(e) = staged.persist(&target) {
            tracing::debug!(artifact.id = %artifact, error = %e, "descriptor not cached");
        }
        drop(lock);
    }

    fn local_versions(&self, artifact: &ArtifactIdentification) -> Vec<Version> {
        FileSystemTransport
            .versions(&self.local, artifact)
            .unwrap_or_default()
    }
}

impl RepositoryReflection for ConfiguredReflection {
    fn resolve_dependency(
        &self,
        dependency: &DependencyIdentification,
    ) -> Maybe<VersionedArtifactIdentification> {
        self.check_configuration()?;
        let artifact = dependency.artifact();

        if let Some(version) = dependency.version.exact() {
            let candidate = artifact.versioned(version.clone());
            let visible = self.configuration.offline
                || self.online().any(|r| self.visible(r, &candidate));
            return if visible {
                Ok(candidate)
            } else {
                Err(Self::unresolved(dependency))
            };
        }

        let mut failure = Self::unresolved(dependency);
        let mut candidates = BTreeSet::new();
        if self.configuration.offline {
            candidates.extend(self.local_versions(&artifact));
        } else {
            for repository in self.online().filter(|r| Self::admits(r, &artifact)) {
                match self.transport.versions(repository, &artifact) {
                    Ok(versions) => candidates.extend(
                        versions
                            .into_iter()
                            .filter(|v| self.visible(repository, &artifact.versioned(v.clone()))),
                    ),
                    Err(e) => {
                        tracing::warn!(
                            message = "repository failed to list versions",
                            repository = %repository.name,
                            artifact = %artifact,
                            error = %e
                        );
                        failure.push(
                            Reason::new(
                                ReasonKind::Io,
                                format!("repository `{}` failed", repository.name),
                            )
                            .caused_by(Reason::from_error(&e)),
                        );
                    },
                }
            }
        }

        match dependency.version.best_match(candidates.iter()) {
            Some(version) => {
                tracing::trace!(dependency = %dependency, version = %version, "resolved range");
                Ok(artifact.versioned(version.clone()))
            },
            None => Err(failure),
        }
    }

    fn resolve_artifact(
        &self,
        artifact: &VersionedArtifactIdentification,
    ) -> Maybe<Arc<ArtifactModel>> {
        self.check_configuration()?;
        if let Some(cached) = self.descriptors.get(artifact) {
            return Ok(cached.model);
        }

        let (model, repository) = match self.read_local_descriptor(artifact)? {
            Some(model) => (model, None),
            None if self.configuration.offline => {
                return Err(Reason::new(
                    ReasonKind::UnresolvedArtifact,
                    format!("no descriptor of {artifact} in the local repository"),
                ));
            },
            None => {
                let (model, repository) = self.fetch_descriptor(artifact)?;
                (model, Some(repository))
            },
        };

        let described = model.id();
        if described.artifact != artifact.artifact {
            return Err(Reason::new(
                ReasonKind::InvalidArtifact,
                format!("descriptor of {artifact} describes {described}"),
            ));
        }

        self.descriptors.insert(
            artifact.clone(),
            CachedDescriptor {
                model: Arc::clone(&model),
                repository,
            },
        );
        Ok(model)
    }

    fn list_available_parts(
        &self,
        artifact: &VersionedArtifactIdentification,
    ) -> Result<Vec<PartKey>, ReflectionError> {
        self.check_configuration()
            .map_err(ReflectionError::Configuration)?;

        let mut parts = BTreeSet::new();
        let mut listed = self.configuration.offline;
        for repository in self.serving(artifact) {
            let found = self
                .transport
                .parts(repository, artifact)
                .map_err(|source| ReflectionError::Transport {
                    repository: repository.name.clone(),
                    source,
                })?;
            if let Some(found) = found {
                listed = true;
                parts.extend(found.into_iter().filter(|p| {
                    repository
                        .artifact_filter
                        .as_ref()
                        .is_none_or(|f| f.matches_part(artifact, p))
                }));
            }
        }
        if !listed {
            return Err(ReflectionError::Unlistable(artifact.clone()));
        }

        if let Ok(Some(local)) = FileSystemTransport.parts(&self.local, artifact) {
            parts.extend(local);
        }
        Ok(parts.into_iter().collect())
    }

    fn download_part(
        &self,
        artifact: &VersionedArtifactIdentification,
        part: &PartKey,
        target: &Path,
    ) -> Result<Option<String>, ReflectionError> {
        self.check_configuration()
            .map_err(ReflectionError::Configuration)?;

        for repository in self.serving(artifact) {
            if !repository
                .artifact_filter
                .as_ref()
                .is_none_or(|f| f.matches_part(artifact, part))
            {
                continue;
            }
            let found = self
                .transport
                .fetch(repository, artifact, part, target)
                .map_err(|source| ReflectionError::Transport {
                    repository: repository.name.clone(),
                    source,
                })?;
            if found {
                return Ok(Some(repository.name.clone()));
            }
        }
        Ok(None)
    }

    fn repository(&self, name: &str) -> Option<&Repository> {
        self.configuration.repository(name)
    }

    fn local_repository(&self) -> &Path {
        &self.local_root
    }
}

#[cfg(test)]
mod test;
