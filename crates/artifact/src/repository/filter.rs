//! Artifact filters restrict which artifacts, versions and parts a repository
//! may serve.
//!
//! Filters are evaluated on three levels. At artifact level only group and
//! name are known, version and part constraints cannot reject yet. At version
//! level the version is known too, and at part level also the part key.
//! A constraint on a fact the level does not know leaves the result undecided,
//! which negation keeps undecided and which finally admits the subject.

use std::collections::BTreeSet;
use std::sync::Arc;

use depot_version::{Version, VersionRange};
use serde::{Deserialize, Serialize};

use crate::id::{ArtifactIdentification, PartKey, VersionedArtifactIdentification};

//================================================================================================
// Types
//================================================================================================

/// A predicate over artifacts, versions and parts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ArtifactFilter {
    /// Matches everything.
    All,
    /// Matches nothing.
    None,
    /// Matches by fixed coordinate components.
    Qualified(QualifiedArtifactFilter),
    /// Pins listed artifacts to exactly one version each.
    Locked {
        /// Locked coordinates; artifacts not listed are unrestricted.
        locks: BTreeSet<VersionedArtifactIdentification>,
    },
    /// Matches when every operand matches.
    Conjunction {
        /// The operands.
        operands: Vec<ArtifactFilter>,
    },
    /// Matches when any operand matches.
    Disjunction {
        /// The operands, shared between repositories after normalization.
        operands: Arc<Vec<ArtifactFilter>>,
    },
    /// Inverts its operand.
    Negation {
        /// The inverted filter.
        operand: Box<ArtifactFilter>,
    },
    /// Restricts to a development view.
    ///
    /// With `restrict_on_artifact_level` the restriction only decides which
    /// artifacts are visible; every version of a visible artifact is admitted.
    DevelopmentView {
        /// The wrapped restriction.
        restriction: Arc<ArtifactFilter>,
        /// Evaluate the restriction on group and name only.
        #[serde(default)]
        restrict_on_artifact_level: bool,
    },
}

/// Coordinate components a [`ArtifactFilter::Qualified`] filter requires.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct QualifiedArtifactFilter {
    /// Required group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Required name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Required versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionRange>,
    /// Required classifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    /// Required part type.
    #[serde(rename = "part-type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// What is known about the thing being filtered.
#[derive(Clone, Copy)]
struct Subject<'a> {
    artifact: &'a ArtifactIdentification,
    version: Option<&'a Version>,
    part: Option<&'a PartKey>,
}

//================================================================================================
// Impls
//================================================================================================

impl ArtifactFilter {
    /// Wraps operands into a disjunction.
    pub fn any_of(operands: Vec<ArtifactFilter>) -> Self {
        ArtifactFilter::Disjunction {
            operands: Arc::new(operands),
        }
    }

    /// Matches on group and name only.
    pub fn matches_artifact(&self, artifact: &ArtifactIdentification) -> bool {
        self.evaluate(Subject {
            artifact,
            version: None,
            part: None,
        })
        .unwrap_or(true)
    }

    /// Matches a concrete version.
    pub fn matches_version(&self, artifact: &VersionedArtifactIdentification) -> bool {
        self.evaluate(Subject {
            artifact: &artifact.artifact,
            version: Some(&artifact.version),
            part: None,
        })
        .unwrap_or(true)
    }

    /// Matches a part of a concrete version.
    pub fn matches_part(&self, artifact: &VersionedArtifactIdentification, part: &PartKey) -> bool {
        self.evaluate(Subject {
            artifact: &artifact.artifact,
            version: Some(&artifact.version),
            part: Some(part),
        })
        .unwrap_or(true)
    }

    /// Three valued evaluation: `None` when the decision depends on facts the
    /// subject does not carry yet. Undecided subjects are admitted.
    fn evaluate(&self, subject: Subject<'_>) -> Option<bool> {
        match self {
            ArtifactFilter::All => Some(true),
            ArtifactFilter::None => Some(false),
            ArtifactFilter::Qualified(q) => q.evaluate(subject),
            ArtifactFilter::Locked { locks } => {
                let pinned: Vec<_> = locks
                    .iter()
                    .filter(|l| &l.artifact == subject.artifact)
                    .collect();
                match (pinned.is_empty(), subject.version) {
                    (true, _) => Some(true),
                    (false, None) => None,
                    (false, Some(version)) => Some(pinned.iter().any(|l| &l.version == version)),
                }
            },
            ArtifactFilter::Conjunction { operands } => {
                let mut result = Some(true);
                for o in operands {
                    match o.evaluate(subject) {
                        Some(false) => return Some(false),
                        None => result = None,
                        Some(true) => {},
                    }
                }
                result
            },
            ArtifactFilter::Disjunction { operands } => {
                let mut result = Some(false);
                for o in operands.iter() {
                    match o.evaluate(subject) {
                        Some(true) => return Some(true),
                        None => result = None,
                        Some(false) => {},
                    }
                }
                result
            },
            ArtifactFilter::Negation { operand } => operand.evaluate(subject).map(|b| !b),
            ArtifactFilter::DevelopmentView {
                restriction,
                restrict_on_artifact_level,
            } => {
                if *restrict_on_artifact_level {
                    let artifact_only = Subject {
                        version: None,
                        part: None,
                        ..subject
                    };
                    Some(restriction.evaluate(artifact_only).unwrap_or(true))
                } else {
                    restriction.evaluate(subject)
                }
            },
        }
    }
}

impl QualifiedArtifactFilter {
    fn evaluate(&self, subject: Subject<'_>) -> Option<bool> {
        let eq = |want: &Option<String>, have: &str| want.as_deref().is_none_or(|w| w == have);

        if !eq(&self.group, &subject.artifact.group) || !eq(&self.name, &subject.artifact.name) {
            return Some(false);
        }

        let mut undecided = false;
        if let Some(range) = &self.version {
            match subject.version {
                Some(version) if !range.contains(version) => return Some(false),
                Some(_) => {},
                None => undecided = true,
            }
        }
        if self.classifier.is_some() || self.kind.is_some() {
            match subject.part {
                Some(part) => {
                    let classifier_ok = self.classifier.is_none()
                        || self.classifier.as_deref() == part.classifier.as_deref();
                    if !classifier_ok || !eq(&self.kind, &part.kind) {
                        return Some(false);
                    }
                },
                None => undecided = true,
            }
        }
        (!undecided).then_some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> VersionedArtifactIdentification {
        s.parse().unwrap()
    }

    #[test]
    fn qualified_levels() {
        let filter = ArtifactFilter::Qualified(QualifiedArtifactFilter {
            group: Some("com.acme".into()),
            version: Some("[1.0,2.0)".parse().unwrap()),
            kind: Some("jar".into()),
            ..Default::default()
        });
        let lib = id("com.acme:lib#2.5");

        assert!(filter.matches_artifact(&lib.artifact));
        assert!(!filter.matches_version(&lib));
        assert!(filter.matches_version(&id("com.acme:lib#1.5")));
        assert!(!filter.matches_part(&id("com.acme:lib#1.5"), &PartKey::descriptor()));
        assert!(!filter.matches_artifact(&ArtifactIdentification::new("org.other", "lib")));
    }

    #[test]
    fn locked_pins_versions() {
        let filter = ArtifactFilter::Locked {
            locks: [id("com.acme:lib#1.0")].into_iter().collect(),
        };
        assert!(filter.matches_version(&id("com.acme:lib#1.0")));
        assert!(!filter.matches_version(&id("com.acme:lib#1.1")));
        assert!(filter.matches_version(&id("com.acme:other#9")));
    }

    #[test]
    fn development_view_opens_versions() {
        let restriction = Arc::new(ArtifactFilter::Locked {
            locks: [id("com.acme:lib#1.0")].into_iter().collect(),
        });
        let view = ArtifactFilter::DevelopmentView {
            restriction: restriction.clone(),
            restrict_on_artifact_level: true,
        };
        assert!(view.matches_version(&id("com.acme:lib#1.1")));

        let strict = ArtifactFilter::DevelopmentView {
            restriction,
            restrict_on_artifact_level: false,
        };
        assert!(!strict.matches_version(&id("com.acme:lib#1.1")));
    }

    #[test]
    fn serde_shape() -> anyhow::Result<()> {
        let filter: ArtifactFilter = toml_edit::de::from_str(
            r#"
            type = "disjunction"
            operands = [
                { type = "qualified", group = "com.acme" },
                { type = "negation", operand = { type = "all" } },
            ]
            "#,
        )?;
        assert!(filter.matches_artifact(&ArtifactIdentification::new("com.acme", "x")));
        assert!(!filter.matches_artifact(&ArtifactIdentification::new("org", "x")));
        Ok(())
    }

    #[test]
    fn negation_stays_undecided_without_facts() {
        let not_two = ArtifactFilter::Negation {
            operand: Box::new(ArtifactFilter::Qualified(QualifiedArtifactFilter {
                version: Some("[2.0]".parse().unwrap()),
                ..Default::default()
            })),
        };
        assert!(not_two.matches_artifact(&ArtifactIdentification::new("com.acme", "lib")));
        assert!(not_two.matches_version(&id("com.acme:lib#1.0")));
        assert!(!not_two.matches_version(&id("com.acme:lib#2.0")));
    }
}
