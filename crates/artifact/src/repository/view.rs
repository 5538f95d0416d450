use std::path::Path;

use lazy_regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ArtifactFilter, ConfigurationError, Repository};
use crate::id::VersionedArtifactIdentification;

//================================================================================================
// Types
//================================================================================================

/// A named, partial repository configuration plus late enrichments.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct RepositoryView {
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Repositories contributed by this view; `None` marks an invalid entry.
    #[serde(default)]
    pub repositories: Vec<Option<Repository>>,
    /// Enrichments applied after every view was merged.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enrichments: Vec<ConfigurationEnrichment>,
    /// The artifact this view was read from.
    #[serde(skip)]
    pub origin: Option<VersionedArtifactIdentification>,
}

/// A late modification of every repository a selector picks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "enrichment", rename_all = "kebab-case")]
pub enum ConfigurationEnrichment {
    /// Merges `repository` into each selected repository.
    Repository {
        /// Picks the repositories to enrich.
        selector: RepositorySelector,
        /// Fields to merge in.
        repository: Repository,
    },
    /// Merges an additional artifact filter into each selected repository.
    ArtifactFilter {
        /// Picks the repositories to enrich.
        selector: RepositorySelector,
        /// The filter to merge in.
        artifact_filter: ArtifactFilter,
    },
}

/// Picks repositories for a [`ConfigurationEnrichment`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "select", rename_all = "kebab-case")]
pub enum RepositorySelector {
    /// Every repository.
    All,
    /// The repository with exactly this name.
    ByName {
        /// The name.
        name: String,
    },
    /// Repositories whose whole name matches a regular expression.
    ByNameRegex {
        /// The expression.
        pattern: String,
    },
    /// Repositories of a variant, by its serialized type name.
    ByType {
        /// The type name, e.g. `remote`.
        #[serde(rename = "type")]
        kind: String,
    },
}

//================================================================================================
// Impls
//================================================================================================

impl RepositoryView {
    /// Reads a view from a TOML file.
    pub fn read(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_owned(),
            source,
        })?;
        Ok(toml_edit::de::from_str(&content)?)
    }

    /// How the view is named in diagnostics.
    pub fn label(&self, index: usize) -> String {
        match (&self.origin, &self.name) {
            (Some(origin), _) => format!("artifact {origin}"),
            (None, Some(name)) => format!("view '{name}'"),
            (None, None) => format!("view #{}", index + 1),
        }
    }
}

impl ConfigurationEnrichment {
    /// The selector of the enrichment.
    pub fn selector(&self) -> &RepositorySelector {
        match self {
            ConfigurationEnrichment::Repository { selector, .. } => selector,
            ConfigurationEnrichment::ArtifactFilter { selector, .. } => selector,
        }
    }
}

impl RepositorySelector {
    /// Compiles the selector into a predicate.
    pub fn compile(&self) -> Result<CompiledSelector<'_>, lazy_regex::regex::Error> {
        Ok(match self {
            RepositorySelector::ByNameRegex { pattern } => {
                CompiledSelector::Regex(Regex::new(&format!("^(?:{pattern})$"))?)
            },
            other => CompiledSelector::Plain(other),
        })
    }
}

/// A selector ready for matching.
pub enum CompiledSelector<'a> {
    /// A selector needing no preparation.
    Plain(&'a RepositorySelector),
    /// A compiled name expression.
    Regex(Regex),
}

impl CompiledSelector<'_> {
    /// Whether the selector picks `repository`.
    pub fn selects(&self, repository: &Repository) -> bool {
        match self {
            CompiledSelector::Regex(re) => re.is_match(&repository.name),
            CompiledSelector::Plain(RepositorySelector::All) => true,
            CompiledSelector::Plain(RepositorySelector::ByName { name }) => &repository.name == name,
            CompiledSelector::Plain(RepositorySelector::ByType { kind }) => {
                repository.kind.type_name() == kind
            },
            CompiledSelector::Plain(RepositorySelector::ByNameRegex { .. }) => false,
        }
    }
}
