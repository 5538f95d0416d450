//! # Artifact Coordinates
//!
//! Value types identifying artifacts, their dependencies and their parts.
//!
//! ## String Forms
//!
//! ```text
//! com.acme:lib               ArtifactIdentification
//! com.acme:lib#1.2           VersionedArtifactIdentification
//! com.acme:lib#[1.0,2.0)     DependencyIdentification / Dependency
//! sources:jar                PartKey with classifier
//! jar                        PartKey without classifier
//! com.acme:*                 Exclusion
//! ```
//!
//! All of them are plain values: equality and hashing are structural and
//! parsing never touches a repository.

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use depot_version::{Version, VersionError, VersionRange};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const WILDCARD: &str = "*";
const DEFAULT_TYPE: &str = "jar";

//================================================================================================
// Types
//================================================================================================

/// An artifact identity independent of its version.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactIdentification {
    /// The (dotted) group the artifact belongs to.
    pub group: String,
    /// The artifact name, unique within its group.
    pub name: String,
}

/// An artifact identity pinned to a concrete version.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionedArtifactIdentification {
    /// Group and name.
    pub artifact: ArtifactIdentification,
    /// The concrete version.
    pub version: Version,
}

/// An artifact identity paired with the versions it accepts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DependencyIdentification {
    /// The (dotted) group the artifact belongs to.
    pub group: String,
    /// The artifact name.
    pub name: String,
    /// The acceptable versions.
    pub version: VersionRange,
}

/// The scope of a dependency declaration.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Needed to compile and run; transitive.
    #[default]
    Compile,
    /// Supplied by the runtime environment.
    Provided,
    /// Needed only to run.
    Runtime,
    /// Needed only to test.
    Test,
    /// Supplied by the system, never fetched.
    System,
}

/// A dependency as declared by a depender's descriptor.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    /// The (dotted) group of the dependency.
    pub group: String,
    /// The name of the dependency.
    pub name: String,
    /// The acceptable versions.
    pub version: VersionRange,
    /// Declared scope, `compile` when omitted.
    #[serde(default)]
    pub scope: Scope,
    /// Whether the dependency is optional for the depender's consumers.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    /// The classifier of the wanted part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    /// The type of the wanted part.
    #[serde(rename = "type", default = "default_type")]
    pub kind: String,
    /// Artifacts excluded from the dependency's own subtree.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exclusions: BTreeSet<Exclusion>,
}

/// Identifies one physical file of an artifact.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartKey {
    /// Optional classifier, e.g. `sources`.
    pub classifier: Option<String>,
    /// File type, used as extension, e.g. `jar`.
    pub kind: String,
}

/// An exclusion pattern, either side may be the `*` wildcard.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Exclusion {
    /// Group pattern.
    pub group: String,
    /// Name pattern.
    pub name: String,
}

/// Errors that can occur while parsing coordinates.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The coordinate lacks a required component.
    #[error("malformed coordinate `{0}`, expected `group:name[#version]`")]
    Malformed(String),
    /// The coordinate needs a version but has none.
    #[error("coordinate `{0}` lacks a version")]
    MissingVersion(String),
    /// The part key is empty or has too many components.
    #[error("malformed part key `{0}`, expected `[classifier:]type`")]
    Part(String),
    /// The version or range is invalid.
    #[error(transparent)]
    Version(#[from] VersionError),
}

//================================================================================================
// Impls
//================================================================================================

impl ArtifactIdentification {
    /// Creates an identification from group and name.
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Pins this identification to `version`.
    pub fn versioned(&self, version: Version) -> VersionedArtifactIdentification {
        VersionedArtifactIdentification {
            artifact: self.clone(),
            version,
        }
    }

    /// The group as a relative path (`com.acme` becomes `com/acme`).
    pub fn group_path(&self) -> PathBuf {
        self.group.split('.').collect()
    }
}

impl VersionedArtifactIdentification {
    /// Creates an identification from its components.
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        ArtifactIdentification::new(group, name).versioned(version)
    }

    /// The group of the artifact.
    pub fn group(&self) -> &str {
        &self.artifact.group
    }

    /// The name of the artifact.
    pub fn name(&self) -> &str {
        &self.artifact.name
    }
}

impl DependencyIdentification {
    /// The identification without the version range.
    pub fn artifact(&self) -> ArtifactIdentification {
        ArtifactIdentification::new(&self.group, &self.name)
    }
}

impl Dependency {
    /// Creates a compile scoped, non optional dependency on the binary part.
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: VersionRange) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version,
            scope: Scope::default(),
            optional: false,
            classifier: None,
            kind: default_type(),
            exclusions: BTreeSet::new(),
        }
    }

    /// Sets the scope.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Marks the dependency optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Adds an exclusion.
    pub fn excluding(mut self, exclusion: Exclusion) -> Self {
        self.exclusions.insert(exclusion);
        self
    }

    /// The identification without the version range.
    pub fn artifact(&self) -> ArtifactIdentification {
        ArtifactIdentification::new(&self.group, &self.name)
    }

    /// The coordinate handed to a repository for resolution.
    pub fn identification(&self) -> DependencyIdentification {
        DependencyIdentification {
            group: self.group.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    /// The part this dependency refers to.
    pub fn part_key(&self) -> PartKey {
        PartKey {
            classifier: self.classifier.clone(),
            kind: self.kind.clone(),
        }
    }
}

impl From<DependencyIdentification> for Dependency {
    fn from(id: DependencyIdentification) -> Self {
        Dependency::new(id.group, id.name, id.version)
    }
}

impl From<&VersionedArtifactIdentification> for Dependency {
    fn from(id: &VersionedArtifactIdentification) -> Self {
        Dependency::new(
            &id.artifact.group,
            &id.artifact.name,
            VersionRange::Exact(id.version.clone()),
        )
    }
}

impl PartKey {
    /// Creates a key from an optional classifier and a type.
    pub fn new(classifier: Option<&str>, kind: impl Into<String>) -> Self {
        Self {
            classifier: classifier.map(str::to_owned),
            kind: kind.into(),
        }
    }

    /// The artifact descriptor.
    pub fn descriptor() -> Self {
        Self::new(None, "toml")
    }

    /// The main binary.
    pub fn binary() -> Self {
        Self::new(None, DEFAULT_TYPE)
    }

    /// The source archive.
    pub fn sources() -> Self {
        Self::new(Some("sources"), DEFAULT_TYPE)
    }

    /// The documentation archive.
    pub fn docs() -> Self {
        Self::new(Some("javadoc"), DEFAULT_TYPE)
    }

    /// The repository view carried by view artifacts.
    pub fn repository_view() -> Self {
        Self::new(Some("repositoryview"), "toml")
    }

    /// File name of this part for `artifact`: `<name>-<version>[-<classifier>].<type>`.
    pub fn file_name(&self, artifact: &VersionedArtifactIdentification) -> String {
        match &self.classifier {
            Some(c) => format!(
                "{}-{}-{}.{}",
                artifact.artifact.name, artifact.version, c, self.kind
            ),
            None => format!(
                "{}-{}.{}",
                artifact.artifact.name, artifact.version, self.kind
            ),
        }
    }

    /// Inverse of [`PartKey::file_name`], `None` when the file belongs to another artifact.
    pub fn from_file_name(artifact: &VersionedArtifactIdentification, file: &str) -> Option<Self> {
        let prefix = format!("{}-{}", artifact.artifact.name, artifact.version);
        let rest = file.strip_prefix(&prefix)?;
        let (stem, kind) = rest.rsplit_once('.')?;
        if kind.is_empty() {
            return None;
        }
        match stem {
            "" => Some(Self::new(None, kind)),
            s => s
                .strip_prefix('-')
                .filter(|c| !c.is_empty())
                .map(|c| Self::new(Some(c), kind)),
        }
    }
}

impl Exclusion {
    /// Creates an exclusion pattern.
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Tests whether the pattern covers `artifact`.
    pub fn matches(&self, artifact: &ArtifactIdentification) -> bool {
        (self.group == WILDCARD || self.group == artifact.group)
            && (self.name == WILDCARD || self.name == artifact.name)
    }
}

impl fmt::Display for ArtifactIdentification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

impl fmt::Display for VersionedArtifactIdentification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.artifact, self.version)
    }
}

impl fmt::Display for DependencyIdentification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.group, self.name, self.version)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.group, self.name, self.version)
    }
}

impl fmt::Display for PartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.classifier {
            Some(c) => write!(f, "{}:{}", c, self.kind),
            None => f.write_str(&self.kind),
        }
    }
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::Compile => "compile",
            Scope::Provided => "provided",
            Scope::Runtime => "runtime",
            Scope::Test => "test",
            Scope::System => "system",
        })
    }
}

impl FromStr for ArtifactIdentification {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (group, name) = split_coordinate(s)?;
        Ok(ArtifactIdentification::new(group, name))
    }
}

impl FromStr for VersionedArtifactIdentification {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, version) = s
            .split_once('#')
            .ok_or_else(|| IdError::MissingVersion(s.to_owned()))?;
        let artifact: ArtifactIdentification = head.parse()?;
        Ok(artifact.versioned(Version::parse(version)?))
    }
}

impl FromStr for DependencyIdentification {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, range) = s.split_once('#').unwrap_or((s, ""));
        let (group, name) = split_coordinate(head)?;
        Ok(DependencyIdentification {
            group: group.to_owned(),
            name: name.to_owned(),
            version: VersionRange::parse(range)?,
        })
    }
}

impl FromStr for Dependency {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<DependencyIdentification>().map(Dependency::from)
    }
}

impl FromStr for PartKey {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut split = s.split(':');
        match (split.next(), split.next(), split.next()) {
            (Some(kind), None, None) if !kind.is_empty() => Ok(PartKey::new(None, kind)),
            (Some(classifier), Some(kind), None) if !classifier.is_empty() && !kind.is_empty() => {
                Ok(PartKey::new(Some(classifier), kind))
            },
            _ => Err(IdError::Part(s.to_owned())),
        }
    }
}

impl FromStr for Exclusion {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (group, name) = split_coordinate(s)?;
        Ok(Exclusion::new(group, name))
    }
}

impl FromStr for Scope {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compile" => Ok(Scope::Compile),
            "provided" => Ok(Scope::Provided),
            "runtime" => Ok(Scope::Runtime),
            "test" => Ok(Scope::Test),
            "system" => Ok(Scope::System),
            _ => Err(IdError::Malformed(s.to_owned())),
        }
    }
}

macro_rules! string_serde {
    ($($ty:ty),*) => {$(
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    )*};
}

string_serde!(VersionedArtifactIdentification, PartKey, Exclusion);

//================================================================================================
// Functions
//================================================================================================

fn default_type() -> String {
    DEFAULT_TYPE.to_owned()
}

fn split_coordinate(s: &str) -> Result<(&str, &str), IdError> {
    match s.split_once(':') {
        Some((group, name)) if !group.is_empty() && !name.is_empty() && !name.contains(':') => {
            Ok((group, name))
        },
        _ => Err(IdError::Malformed(s.to_owned())),
    }
}
