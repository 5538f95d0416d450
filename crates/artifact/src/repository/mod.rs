//! # Repositories
//!
//! Repository descriptions as they appear in a [`RepositoryConfiguration`] and
//! in the partial [`RepositoryView`]s that get merged into one.
//!
//! ## Variants
//!
//! A [`Repository`] carries the fields every repository has (`name`,
//! `offline`, `cachable`, `artifact_filter`) and a [`RepositoryKind`] holding
//! the variant specific ones:
//!
//! - `repository` - a generic repository, the "supertype" of all others.
//! - `local` - a filesystem tree in the standard layout.
//! - `remote` - a repository reachable through a URL, optionally with
//!   credentials and release/snapshot policies.
//! - `codebase` - a source tree whose layout follows a path template.
//!
//! Every field is optional so that partial descriptions can be merged
//! field by field; an unset field never overrides a set one.

mod filter;
mod view;

use std::path::{Path, PathBuf};

use depot_version::Version;
use serde::{Deserialize, Serialize};
use url::Url;

pub use self::filter::{ArtifactFilter, QualifiedArtifactFilter};
pub use self::view::{ConfigurationEnrichment, RepositorySelector, RepositoryView};
use crate::model::{AtomicWriteError, write_atomic};
use crate::reason::Reason;

/// Layout template used when a codebase repository names none.
pub const DEFAULT_CODEBASE_TEMPLATE: &str = "{groupPath}/{name}/{version}";

//================================================================================================
// Types
//================================================================================================

/// A repository description.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Repository {
    /// Unique name within a configuration.
    #[serde(default)]
    pub name: String,
    /// When set, the repository is not contacted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline: Option<bool>,
    /// Whether fetched content may be cached locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cachable: Option<bool>,
    /// Restricts what the repository may serve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_filter: Option<ArtifactFilter>,
    /// Variant specific fields.
    #[serde(flatten)]
    pub kind: RepositoryKind,
}

/// Variant of a [`Repository`] and its specific fields.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RepositoryKind {
    /// A repository without specific fields.
    #[default]
    #[serde(rename = "repository")]
    Generic,
    /// A local filesystem repository.
    Local(LocalRepository),
    /// A repository reachable through a URL.
    Remote(RemoteRepository),
    /// A source tree with a templated layout.
    Codebase(CodebaseRepository),
}

/// Fields of a local repository.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct LocalRepository {
    /// Root of the repository tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_path: Option<PathBuf>,
}

/// Fields of a remote repository.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct RemoteRepository {
    /// Base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    /// User for authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Password for authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Whether snapshot versions are served, defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<bool>,
    /// Whether release versions are served, defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub releases: Option<bool>,
}

/// Fields of a codebase repository.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct CodebaseRepository {
    /// Root of the source tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_path: Option<PathBuf>,
    /// Layout template with `{group}`, `{groupPath}`, `{name}` and `{version}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// The role a version plays when picking repositories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepositoryRole {
    /// A fixed release version.
    Release,
    /// A moving snapshot version.
    Snapshot,
}

/// The consolidated configuration all repository access is based on.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct RepositoryConfiguration {
    /// Root of the local repository, overriding the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_repository_path: Option<PathBuf>,
    /// Only content already in the local repository is used.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub offline: bool,
    /// Repositories in lookup order.
    #[serde(default)]
    pub repositories: Vec<Repository>,
    /// Set when the configuration failed to load or validate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Reason>,
}

/// Errors that can occur reading or writing configuration files.
#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    /// The file could not be read or written.
    #[error("repository configuration `{path}` is inaccessible: {source}")]
    Io {
        /// The file.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// The file does not hold a valid configuration.
    #[error(transparent)]
    De(#[from] toml_edit::de::Error),
    /// The configuration could not be serialized.
    #[error(transparent)]
    Ser(#[from] toml_edit::ser::Error),
    /// An atomic write could not be completed.
    #[error(transparent)]
    Persist(#[from] tempfile::PersistError),
}

//================================================================================================
// Impls
//================================================================================================

impl Repository {
    /// Creates a named repository of the given kind with all other fields unset.
    pub fn new(name: impl Into<String>, kind: RepositoryKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }

    /// A named local repository.
    pub fn local(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self::new(
            name,
            RepositoryKind::Local(LocalRepository {
                root_path: Some(root.into()),
            }),
        )
    }

    /// A named remote repository.
    pub fn remote(name: impl Into<String>, url: Url) -> Self {
        Self::new(
            name,
            RepositoryKind::Remote(RemoteRepository {
                url: Some(url),
                ..Default::default()
            }),
        )
    }

    /// Whether the repository must not be contacted.
    pub fn is_offline(&self) -> bool {
        self.offline.unwrap_or(false)
    }

    /// The URL, for variants that have one.
    pub fn url(&self) -> Option<&Url> {
        match &self.kind {
            RepositoryKind::Remote(r) => r.url.as_ref(),
            _ => None,
        }
    }

    /// User and password, for variants that authenticate.
    pub fn credentials(&self) -> Option<(&str, Option<&str>)> {
        match &self.kind {
            RepositoryKind::Remote(r) => r.user.as_deref().map(|u| (u, r.password.as_deref())),
            _ => None,
        }
    }

    /// The root path, for variants backed by a directory.
    pub fn root_path(&self) -> Option<&Path> {
        match &self.kind {
            RepositoryKind::Local(l) => l.root_path.as_deref(),
            RepositoryKind::Codebase(c) => c.root_path.as_deref(),
            _ => None,
        }
    }

    /// Whether the repository serves versions of `role`.
    pub fn serves(&self, role: RepositoryRole) -> bool {
        match (&self.kind, role) {
            (RepositoryKind::Remote(r), RepositoryRole::Release) => r.releases.unwrap_or(true),
            (RepositoryKind::Remote(r), RepositoryRole::Snapshot) => r.snapshots.unwrap_or(true),
            _ => true,
        }
    }
}

impl RepositoryKind {
    /// The serialized name of the variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            RepositoryKind::Generic => "repository",
            RepositoryKind::Local(_) => "local",
            RepositoryKind::Remote(_) => "remote",
            RepositoryKind::Codebase(_) => "codebase",
        }
    }

    /// Whether a `self` typed value can stand in for `other`, i.e. `self` is
    /// the same variant or the generic supertype.
    pub fn is_assignable_from(&self, other: &RepositoryKind) -> bool {
        matches!(self, RepositoryKind::Generic)
            || std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// A value of the same variant with every field unset.
    pub fn emptied(&self) -> RepositoryKind {
        match self {
            RepositoryKind::Generic => RepositoryKind::Generic,
            RepositoryKind::Local(_) => RepositoryKind::Local(LocalRepository::default()),
            RepositoryKind::Remote(_) => RepositoryKind::Remote(RemoteRepository::default()),
            RepositoryKind::Codebase(_) => RepositoryKind::Codebase(CodebaseRepository::default()),
        }
    }
}

impl CodebaseRepository {
    /// The layout template in effect.
    pub fn template(&self) -> &str {
        self.template.as_deref().unwrap_or(DEFAULT_CODEBASE_TEMPLATE)
    }
}

impl RepositoryRole {
    /// The role of `version`.
    pub fn of(version: &Version) -> Self {
        if version.is_snapshot() {
            RepositoryRole::Snapshot
        } else {
            RepositoryRole::Release
        }
    }
}

impl RepositoryConfiguration {
    /// Looks up a repository by name.
    pub fn repository(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Reads a configuration from a TOML file.
    pub fn read(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_owned(),
            source,
        })?;
        Ok(toml_edit::de::from_str(&content)?)
    }

    /// Serializes the configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigurationError> {
        Ok(toml_edit::ser::to_string_pretty(self)?)
    }

    /// Writes the configuration atomically.
    pub fn write(&self, path: &Path) -> Result<(), ConfigurationError> {
        let content = self.to_toml()?;
        write_atomic(path, content.as_bytes()).map_err(|e| match e {
            AtomicWriteError::Io(source) => ConfigurationError::Io {
                path: path.to_owned(),
                source,
            },
            AtomicWriteError::Persist(p) => ConfigurationError::Persist(p),
        })
    }
}
