//! # Artifact Descriptors
//!
//! The descriptor of an artifact names the artifact, its packaging, its
//! dependencies and optionally a parent, imported artifacts and a relocation.
//! Descriptors are stored as the artifact's `toml` part:
//!
//! ```toml
//! [artifact]
//! group = "com.acme"
//! name = "app"
//! version = "1.0"
//! packaging = "jar"
//!
//! [parent]
//! group = "com.acme"
//! name = "parent"
//! version = "[1.0,2.0)"
//!
//! [[imports]]
//! group = "com.acme"
//! name = "bom"
//! version = "3.0"
//!
//! [[dependencies]]
//! group = "com.acme"
//! name = "lib"
//! version = "2.0"
//! scope = "runtime"
//! exclusions = ["org.noise:*"]
//! ```
//!
//! A `[relocation]` table redirects consumers to another coordinate; omitted
//! fields keep the relocated artifact's own value.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use depot_version::Version;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use toml_edit::DocumentMut;

use crate::id::{Dependency, DependencyIdentification, VersionedArtifactIdentification};

//================================================================================================
// Types
//================================================================================================

/// The parsed descriptor of an artifact.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ArtifactModel {
    /// Identification and packaging.
    pub artifact: ArtifactHeader,
    /// The parent whose declarations this artifact inherits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<DependencyIdentification>,
    /// Artifacts whose managed declarations are imported.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<DependencyIdentification>,
    /// Where consumers should go instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relocation: Option<Relocation>,
    /// Declared dependencies, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

/// The `[artifact]` table of a descriptor.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ArtifactHeader {
    /// The (dotted) group.
    pub group: String,
    /// The artifact name.
    pub name: String,
    /// The concrete version.
    pub version: Version,
    /// Packaging, i.e. the type of the main part.
    #[serde(default = "default_packaging")]
    pub packaging: String,
}

/// A relocation of an artifact to another coordinate.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct Relocation {
    /// New group, if changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// New name, if changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New version, if changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

#[derive(thiserror::Error, Debug)]
/// Errors that can occur reading or writing descriptors.
pub enum DescriptorError {
    /// The descriptor file could not be read or written.
    #[error("descriptor `{path}` is inaccessible: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// The descriptor is not valid TOML or does not match the model.
    #[error(transparent)]
    De(#[from] toml_edit::de::Error),
    /// The descriptor is not a TOML document.
    #[error(transparent)]
    Parse(#[from] toml_edit::TomlError),
    /// The model could not be serialized.
    #[error(transparent)]
    Ser(#[from] toml_edit::ser::Error),
    /// The `[artifact]` table is missing a field.
    #[error("descriptor lacks `artifact.{0}`")]
    Missing(&'static str),
    /// The `[artifact]` table carries an invalid version.
    #[error(transparent)]
    Version(#[from] depot_version::VersionError),
    /// An atomic write could not be completed.
    #[error(transparent)]
    Persist(#[from] tempfile::PersistError),
}

//================================================================================================
// Impls
//================================================================================================

impl ArtifactModel {
    /// Creates a descriptor without dependencies.
    pub fn new(id: &VersionedArtifactIdentification, packaging: impl Into<String>) -> Self {
        Self {
            artifact: ArtifactHeader {
                group: id.artifact.group.clone(),
                name: id.artifact.name.clone(),
                version: id.version.clone(),
                packaging: packaging.into(),
            },
            parent: None,
            imports: Vec::new(),
            relocation: None,
            dependencies: Vec::new(),
        }
    }

    /// The coordinate this descriptor describes.
    pub fn id(&self) -> VersionedArtifactIdentification {
        VersionedArtifactIdentification::new(
            &self.artifact.group,
            &self.artifact.name,
            self.artifact.version.clone(),
        )
    }

    /// The packaging of the artifact.
    pub fn packaging(&self) -> &str {
        &self.artifact.packaging
    }

    /// Serializes the descriptor to TOML.
    pub fn to_toml(&self) -> Result<String, DescriptorError> {
        Ok(toml_edit::ser::to_string_pretty(self)?)
    }
}

impl FromStr for ArtifactModel {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml_edit::de::from_str(s)?)
    }
}

impl Relocation {
    /// Applies the relocation to `from`.
    pub fn target(&self, from: &VersionedArtifactIdentification) -> VersionedArtifactIdentification {
        VersionedArtifactIdentification::new(
            self.group.as_deref().unwrap_or(from.group()),
            self.name.as_deref().unwrap_or(from.name()),
            self.version.clone().unwrap_or_else(|| from.version.clone()),
        )
    }
}

//================================================================================================
// Functions
//================================================================================================

fn default_packaging() -> String {
    String::from("jar")
}

/// Reads and parses the descriptor at `path`.
pub fn read_artifact_descriptor(path: &Path) -> Result<ArtifactModel, DescriptorError> {
    let content = std::fs::read_to_string(path).map_err(|source| DescriptorError::Io {
        path: path.to_owned(),
        source,
    })?;
    content.parse()
}

/// Extracts only the coordinate from the descriptor at `path`.
///
/// Reads the `[artifact]` table without validating the rest of the document.
pub fn read_identification(path: &Path) -> Result<VersionedArtifactIdentification, DescriptorError> {
    let content = std::fs::read_to_string(path).map_err(|source| DescriptorError::Io {
        path: path.to_owned(),
        source,
    })?;
    let doc: DocumentMut = content.parse()?;
    let field = |key: &'static str| {
        doc.get("artifact")
            .and_then(|a| a.get(key))
            .and_then(|v| v.as_str())
            .ok_or(DescriptorError::Missing(key))
    };
    Ok(VersionedArtifactIdentification::new(
        field("group")?,
        field("name")?,
        Version::parse(field("version")?)?,
    ))
}

/// Writes `model` to `path` atomically.
pub fn write_artifact_descriptor(model: &ArtifactModel, path: &Path) -> Result<(), DescriptorError> {
    let content = model.to_toml()?;
    write_atomic(path, content.as_bytes()).map_err(|e| match e {
        AtomicWriteError::Io(source) => DescriptorError::Io {
            path: path.to_owned(),
            source,
        },
        AtomicWriteError::Persist(p) => DescriptorError::Persist(p),
    })
}

/// Failure of [`write_atomic`].
#[derive(thiserror::Error, Debug)]
pub(crate) enum AtomicWriteError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Persist(#[from] tempfile::PersistError),
}

/// Writes `content` next to `path` and renames it into place.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<(), AtomicWriteError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::with_prefix_in(".depot-", dir)?;
    tmp.write_all(content)?;
    tmp.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"
[artifact]
group = "com.acme"
name = "app"
version = "1.0"

[parent]
group = "com.acme"
name = "parent"
version = "[1.0,2.0)"

[relocation]
name = "app-ng"

[[dependencies]]
group = "com.acme"
name = "lib"
version = "2.0"
scope = "runtime"
optional = true
"#;

    #[test]
    fn parse_descriptor() -> anyhow::Result<()> {
        let model: ArtifactModel = DESCRIPTOR.parse()?;
        assert_eq!(model.id().to_string(), "com.acme:app#1.0");
        assert_eq!(model.packaging(), "jar");
        assert_eq!(model.dependencies.len(), 1);
        assert!(model.dependencies[0].optional);
        assert_eq!(
            model.relocation.as_ref().map(|r| r.target(&model.id()).to_string()),
            Some(String::from("com.acme:app-ng#1.0"))
        );
        Ok(())
    }

    #[test]
    fn identification_only() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("app-1.0.toml");
        std::fs::write(&path, "[artifact]\ngroup = \"g\"\nname = \"n\"\nversion = \"3\"\nunknown = 1\n")?;
        assert_eq!(read_identification(&path)?.to_string(), "g:n#3");
        assert!(read_artifact_descriptor(&path).is_err());
        Ok(())
    }

    #[test]
    fn write_then_read() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested/app-1.0.toml");
        let model: ArtifactModel = DESCRIPTOR.parse()?;
        write_artifact_descriptor(&model, &path)?;
        assert_eq!(read_artifact_descriptor(&path)?, model);
        Ok(())
    }
}
