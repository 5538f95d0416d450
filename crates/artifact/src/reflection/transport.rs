//! The primitive that moves bytes out of a repository.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use depot_version::Version;
use path_clean::PathClean;

use super::layout;
use crate::id::{ArtifactIdentification, PartKey, VersionedArtifactIdentification};
use crate::repository::{Repository, RepositoryKind};

//================================================================================================
// Types
//================================================================================================

/// Access to the content of one repository.
pub trait Transport: Send + Sync {
    /// Lists the versions `repository` holds of `artifact`.
    fn versions(
        &self,
        repository: &Repository,
        artifact: &ArtifactIdentification,
    ) -> Result<Vec<Version>, TransportError>;

    /// Lists the parts `repository` holds of `artifact`, `None` when it cannot list.
    fn parts(
        &self,
        repository: &Repository,
        artifact: &VersionedArtifactIdentification,
    ) -> Result<Option<Vec<PartKey>>, TransportError>;

    /// Copies a part into `target`; returns `false` when the repository lacks it.
    fn fetch(
        &self,
        repository: &Repository,
        artifact: &VersionedArtifactIdentification,
        part: &PartKey,
        target: &Path,
    ) -> Result<bool, TransportError>;
}

/// Serves repositories that live on a filesystem: local and codebase
/// repositories as well as remote ones with a `file:` URL.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileSystemTransport;

#[derive(thiserror::Error, Debug)]
/// Errors raised by a [`Transport`].
pub enum TransportError {
    /// A filesystem operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The repository has no location this transport understands.
    #[error("repository `{0}` has no location")]
    NoLocation(String),
    /// The URL scheme is not served by this transport.
    #[error("repository `{repository}` uses unsupported scheme `{scheme}`")]
    Unsupported {
        /// The repository.
        repository: String,
        /// The scheme.
        scheme: String,
    },
    /// The repository layout cannot be enumerated.
    #[error("repository `{0}` cannot list versions")]
    Unlistable(String),
}

//================================================================================================
// Impls
//================================================================================================

impl FileSystemTransport {
    fn root(&self, repository: &Repository) -> Result<PathBuf, TransportError> {
        if let Some(root) = repository.root_path() {
            return Ok(root.to_path_buf().clean());
        }
        match repository.url() {
            Some(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(|p| p.clean())
                .map_err(|_| TransportError::NoLocation(repository.name.clone())),
            Some(url) => Err(TransportError::Unsupported {
                repository: repository.name.clone(),
                scheme: url.scheme().to_owned(),
            }),
            None => Err(TransportError::NoLocation(repository.name.clone())),
        }
    }

    fn solution_dir(
        &self,
        repository: &Repository,
        artifact: &VersionedArtifactIdentification,
    ) -> Result<PathBuf, TransportError> {
        let root = self.root(repository)?;
        Ok(match &repository.kind {
            RepositoryKind::Codebase(c) => {
                root.join(layout::expand_template(c.template(), artifact))
            },
            _ => layout::solution_dir(&root, artifact),
        })
    }

    fn versions_dir(
        &self,
        repository: &Repository,
        artifact: &ArtifactIdentification,
    ) -> Result<PathBuf, TransportError> {
        let root = self.root(repository)?;
        match &repository.kind {
            RepositoryKind::Codebase(c) => {
                let parent = c
                    .template()
                    .strip_suffix("{version}")
                    .ok_or_else(|| TransportError::Unlistable(repository.name.clone()))?;
                let placeholder = artifact.versioned(Version::parse("0").map_err(|_| {
                    TransportError::Unlistable(repository.name.clone())
                })?);
                Ok(root.join(layout::expand_template(parent, &placeholder)))
            },
            _ => Ok(layout::artifact_dir(&root, artifact)),
        }
    }
}

impl Transport for FileSystemTransport {
    fn versions(
        &self,
        repository: &Repository,
        artifact: &ArtifactIdentification,
    ) -> Result<Vec<Version>, TransportError> {
        let dir = self.versions_dir(repository, artifact)?;
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(Ok(v)) = entry.file_name().to_str().map(Version::parse) {
                versions.push(v);
            }
        }
        versions.sort();
        Ok(versions)
    }

    fn parts(
        &self,
        repository: &Repository,
        artifact: &VersionedArtifactIdentification,
    ) -> Result<Option<Vec<PartKey>>, TransportError> {
        let dir = self.solution_dir(repository, artifact)?;
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Some(Vec::new())),
            Err(e) => return Err(e.into()),
        };

        let mut parts = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') || name.ends_with(layout::DOWNLOAD_SUFFIX) {
                continue;
            }
            if let Some(key) = PartKey::from_file_name(artifact, name) {
                parts.push(key);
            }
        }
        parts.sort();
        Ok(Some(parts))
    }

    fn fetch(
        &self,
        repository: &Repository,
        artifact: &VersionedArtifactIdentification,
        part: &PartKey,
        target: &Path,
    ) -> Result<bool, TransportError> {
        let source = self
            .solution_dir(repository, artifact)?
            .join(part.file_name(artifact));
        if !source.is_file() {
            return Ok(false);
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&source, target)?;
        tracing::trace!(
            repository = %repository.name,
            source = %source.display(),
            target = %target.display(),
            "copied part"
        );
        Ok(true)
    }
}
