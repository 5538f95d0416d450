//! # Part Enrichment
//!
//! Enrichment attaches parts (binaries, sources, views, ...) to solutions
//! that have already been resolved.
//!
//! ## Transactions
//!
//! [`PartEnricher::enrich`] runs one transaction per solution:
//!
//! 1. the wanted parts are computed, from an explicit list or a predicate
//!    over the parts the repositories list, minus the parts already present;
//! 2. the solution lock is tried. When another thread or process holds it,
//!    the call returns [`EnrichOutcome::Contended`] without touching anything;
//! 3. every part is fetched into a `.download` staging file next to its final
//!    location, polling the abort signal in between. Final files that already
//!    exist on disk are adopted without a download;
//! 4. on success the staging files are renamed into place and all parts are
//!    inserted into the solution's part map under one write lock. On any
//!    failure every file created by the transaction is removed and the part
//!    map is left untouched.
//!
//! A part no repository has is reported to the listener and left out; it
//! does not fail the transaction.
//!
//! [`EnrichmentQueue`] runs transactions for many solutions on a bounded
//! pool of workers.

mod listener;
mod queue;

use std::collections::BTreeSet;
use std::error::Error as _;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

pub use self::listener::{EnrichListener, NoopListener, TracingListener};
pub use self::queue::{EnrichmentQueue, EnrichmentReport};
use crate::AbortSignal;
use crate::id::{PartKey, VersionedArtifactIdentification};
use crate::lock::{LockError, SolutionLocks};
use crate::reason::{Reason, ReasonKind};
use crate::reflection::{ReflectionError, RepositoryReflection, layout};
use crate::repository::RepositoryRole;
use crate::resolution::{Part, Solution};

//================================================================================================
// Types
//================================================================================================

/// The parts a transaction should attach.
#[derive(Clone)]
pub enum WantedParts {
    /// Exactly these parts.
    Explicit(Vec<PartKey>),
    /// Every listed part the predicate accepts.
    Matching(Arc<dyn Fn(&PartKey) -> bool + Send + Sync>),
}

/// What a resolution should enrich its solutions with.
#[derive(Clone, Debug)]
pub struct PartEnrichingContext {
    /// The wanted parts.
    pub wanted: WantedParts,
    /// Label of the walk the enrichment belongs to, passed to listeners.
    pub walk_scope: String,
}

/// The effect of one [`PartEnricher::enrich`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnrichOutcome {
    /// These parts were committed.
    Enriched(Vec<PartKey>),
    /// Every wanted part was already present.
    Unchanged,
    /// Another thread or process is enriching the solution.
    Contended,
}

/// Runs enrichment transactions against a [`RepositoryReflection`].
pub struct PartEnricher {
    reflection: Arc<dyn RepositoryReflection>,
    locks: Arc<SolutionLocks>,
    listener: Arc<dyn EnrichListener>,
}

/// Errors that fail an enrichment transaction. The transaction has been
/// rolled back when one is returned.
#[derive(thiserror::Error, Debug)]
pub enum EnrichingError {
    /// The abort signal was raised.
    #[error("enrichment of {artifact} was aborted")]
    Aborted {
        /// The solution.
        artifact: VersionedArtifactIdentification,
    },
    /// A repository failed while fetching a part.
    #[error("failed to fetch part {part} of {artifact}")]
    Transport {
        /// The solution.
        artifact: VersionedArtifactIdentification,
        /// The part being fetched.
        part: PartKey,
        /// The underlying failure.
        #[source]
        source: ReflectionError,
    },
    /// The solution lock could not be taken.
    #[error("failed to lock {artifact}")]
    Lock {
        /// The solution.
        artifact: VersionedArtifactIdentification,
        /// The underlying failure.
        #[source]
        source: LockError,
    },
    /// A file of the transaction could not be written, renamed or removed.
    #[error("filesystem failure at `{}` while enriching {artifact}", path.display())]
    Filesystem {
        /// The solution.
        artifact: VersionedArtifactIdentification,
        /// The file involved.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// The available parts could not be listed for a predicate.
    #[error("failed to list the parts of {artifact}")]
    Listing {
        /// The solution.
        artifact: VersionedArtifactIdentification,
        /// The underlying failure.
        #[source]
        source: ReflectionError,
    },
}

/// Files created by a running transaction.
struct Transaction<'a> {
    artifact: &'a VersionedArtifactIdentification,
    staged: Vec<Staged>,
    adopted: Vec<Part>,
    created: Vec<PathBuf>,
}

struct Staged {
    key: PartKey,
    download: PathBuf,
    location: PathBuf,
    repository: String,
}

//================================================================================================
// Impls
//================================================================================================

impl WantedParts {
    /// Wants every listed part accepted by `predicate`.
    pub fn matching(predicate: impl Fn(&PartKey) -> bool + Send + Sync + 'static) -> Self {
        WantedParts::Matching(Arc::new(predicate))
    }
}

impl fmt::Debug for WantedParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WantedParts::Explicit(parts) => f.debug_tuple("Explicit").field(parts).finish(),
            WantedParts::Matching(_) => f.write_str("Matching(..)"),
        }
    }
}

impl From<Vec<PartKey>> for WantedParts {
    fn from(parts: Vec<PartKey>) -> Self {
        WantedParts::Explicit(parts)
    }
}

impl PartEnrichingContext {
    /// Creates a context for the walk labelled `walk_scope`.
    pub fn new(walk_scope: impl Into<String>, wanted: impl Into<WantedParts>) -> Self {
        Self {
            wanted: wanted.into(),
            walk_scope: walk_scope.into(),
        }
    }
}

impl EnrichingError {
    /// The solution the transaction was for.
    pub fn artifact(&self) -> &VersionedArtifactIdentification {
        match self {
            EnrichingError::Aborted { artifact }
            | EnrichingError::Transport { artifact, .. }
            | EnrichingError::Lock { artifact, .. }
            | EnrichingError::Filesystem { artifact, .. }
            | EnrichingError::Listing { artifact, .. } => artifact,
        }
    }

    /// The failure as a [`Reason`] carrying the cause chain.
    pub fn reason(&self) -> Reason {
        let kind = match self {
            EnrichingError::Aborted { .. } => ReasonKind::Aborted,
            _ => ReasonKind::EnrichingFailure,
        };
        let mut reason = Reason::new(kind, self.to_string());
        if let Some(source) = self.source() {
            reason.push(Reason::from_error(source));
        }
        reason
    }
}

impl PartEnricher {
    /// Creates an enricher with its own lock registry and no listener.
    pub fn new(reflection: Arc<dyn RepositoryReflection>) -> Self {
        Self {
            reflection,
            locks: Arc::default(),
            listener: Arc::new(NoopListener),
        }
    }

    /// Shares a lock registry, e.g. with a [`crate::reflection::ConfiguredReflection`].
    pub fn with_locks(mut self, locks: Arc<SolutionLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Sets the listener notified about transactions.
    pub fn with_listener(mut self, listener: Arc<dyn EnrichListener>) -> Self {
        self.listener = listener;
        self
    }

    /// The reflection parts are fetched through.
    pub fn reflection(&self) -> &Arc<dyn RepositoryReflection> {
        &self.reflection
    }

    /// Runs one enrichment transaction for `solution`.
    pub fn enrich(
        &self,
        solution: &Solution,
        walk_scope: &str,
        wanted: &WantedParts,
        abort: &AbortSignal,
    ) -> Result<EnrichOutcome, EnrichingError> {
        let artifact = &solution.id;
        if abort.is_aborted() {
            return Err(EnrichingError::Aborted {
                artifact: artifact.clone(),
            });
        }

        let candidates = self.candidates(artifact, wanted)?;
        if Self::missing(solution, &candidates).is_empty() {
            return Ok(EnrichOutcome::Unchanged);
        }

        let root = self.reflection.local_repository();
        let dir = layout::solution_dir(root, artifact);
        let lock = self
            .locks
            .try_acquire(&dir)
            .map_err(|source| EnrichingError::Lock {
                artifact: artifact.clone(),
                source,
            })?;
        let Some(lock) = lock else {
            tracing::debug!(artifact.id = %artifact, "solution is being enriched elsewhere");
            return Ok(EnrichOutcome::Contended);
        };

        // a transaction that held the lock before us may have committed meanwhile
        let missing = Self::missing(solution, &candidates);
        if missing.is_empty() {
            return Ok(EnrichOutcome::Unchanged);
        }

        let span = tracing::info_span!(
            "enrich",
            artifact.id = %artifact,
            role = ?RepositoryRole::of(&artifact.version)
        );
        let _enter = span.enter();
        self.listener
            .enriching_started(artifact, walk_scope, &missing);

        let mut transaction = Transaction {
            artifact,
            staged: Vec::new(),
            adopted: Vec::new(),
            created: Vec::new(),
        };
        let result = self
            .fetch_all(&mut transaction, root, &missing, abort)
            .and_then(|()| transaction.commit(solution));

        match result {
            Ok(keys) => {
                self.listener.enriching_finished(artifact, true);
                drop(lock);
                Ok(EnrichOutcome::Enriched(keys))
            },
            Err(e) => {
                transaction.rollback();
                self.listener.enriching_finished(artifact, false);
                drop(lock);
                Err(e)
            },
        }
    }

    fn candidates(
        &self,
        artifact: &VersionedArtifactIdentification,
        wanted: &WantedParts,
    ) -> Result<BTreeSet<PartKey>, EnrichingError> {
        match wanted {
            WantedParts::Explicit(parts) => Ok(parts.iter().cloned().collect()),
            WantedParts::Matching(predicate) => Ok(self
                .reflection
                .list_available_parts(artifact)
                .map_err(|source| EnrichingError::Listing {
                    artifact: artifact.clone(),
                    source,
                })?
                .into_iter()
                .filter(|p| predicate(p))
                .collect()),
        }
    }

    fn missing(solution: &Solution, candidates: &BTreeSet<PartKey>) -> Vec<PartKey> {
        let present = solution.parts.read().unwrap_or_else(PoisonError::into_inner);
        candidates
            .iter()
            .filter(|k| !present.contains_key(*k))
            .cloned()
            .collect()
    }

    fn fetch_all(
        &self,
        transaction: &mut Transaction<'_>,
        root: &Path,
        parts: &[PartKey],
        abort: &AbortSignal,
    ) -> Result<(), EnrichingError> {
        let artifact = transaction.artifact;
        for part in parts {
            if abort.is_aborted() {
                return Err(EnrichingError::Aborted {
                    artifact: artifact.clone(),
                });
            }

            let location = layout::part_path(root, artifact, part);
            if location.is_file() {
                self.listener.part_downloaded(artifact, part, None);
                transaction.adopted.push(Part {
                    key: part.clone(),
                    location,
                    repository: None,
                });
                continue;
            }

            let download = layout::download_path(&location);
            transaction.remove(&download)?;
            transaction.created.push(download.clone());

            match self.reflection.download_part(artifact, part, &download) {
                Ok(Some(repository)) => {
                    self.listener
                        .part_downloaded(artifact, part, Some(&repository));
                    transaction.staged.push(Staged {
                        key: part.clone(),
                        download,
                        location,
                        repository,
                    });
                },
                Ok(None) => {
                    transaction.remove(&download)?;
                    self.listener.part_not_found(artifact, part);
                },
                Err(source) => {
                    self.listener.part_failed(artifact, part, &source);
                    return Err(EnrichingError::Transport {
                        artifact: artifact.clone(),
                        part: part.clone(),
                        source,
                    });
                },
            }
        }

        if abort.is_aborted() {
            return Err(EnrichingError::Aborted {
                artifact: artifact.clone(),
            });
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    // a panicking transport leaves without an explicit rollback
    fn drop(&mut self) {
        self.rollback();
    }
}

impl Transaction<'_> {
    fn filesystem(&self, path: &Path, source: std::io::Error) -> EnrichingError {
        EnrichingError::Filesystem {
            artifact: self.artifact.clone(),
            path: path.to_owned(),
            source,
        }
    }

    fn remove(&self, path: &Path) -> Result<(), EnrichingError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.filesystem(path, e)),
        }
    }

    /// Renames the staged files into place and publishes every part at once.
    fn commit(&mut self, solution: &Solution) -> Result<Vec<PartKey>, EnrichingError> {
        let mut parts = std::mem::take(&mut self.adopted);
        for staged in std::mem::take(&mut self.staged) {
            if let Err(e) = std::fs::rename(&staged.download, &staged.location) {
                return Err(self.filesystem(&staged.location, e));
            }
            self.created.push(staged.location.clone());
            parts.push(Part {
                key: staged.key,
                location: staged.location,
                repository: Some(staged.repository),
            });
        }

        let keys = parts.iter().map(|p| p.key.clone()).collect();
        let mut map = solution
            .parts
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for part in parts {
            map.insert(part.key.clone(), part);
        }
        self.created.clear();
        Ok(keys)
    }

    /// Removes every file the transaction created.
    fn rollback(&mut self) {
        for path in self.created.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => {},
                Err(e) if e.kind() == ErrorKind::NotFound => {},
                Err(e) => tracing::warn!(
                    message = "failed to remove file during rollback",
                    path = %path.display(),
                    error = %e
                ),
            }
        }
    }
}
