//! # Failure Reasons
//!
//! Resolution failures are data, not control flow: a [`Reason`] is attached to
//! the dependency, artifact or resolution it concerns and may nest the reasons
//! that caused it. Collator reasons ("artifact X is incomplete") group the
//! individual failures below them; [`Reason::leaves`] extracts the root causes.

use std::fmt;

use serde::{Deserialize, Serialize};

//================================================================================================
// Types
//================================================================================================

/// The category of a [`Reason`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonKind {
    /// No artifact matched a dependency's coordinate or range.
    UnresolvedDependency,
    /// A resolved coordinate had no descriptor in any repository.
    UnresolvedArtifact,
    /// The repository configuration failed to load or validate.
    ConfigurationFailure,
    /// Fetching parts of a solution failed.
    EnrichingFailure,
    /// Aggregated input validation failure.
    Validation,
    /// A clash strategy could not pick a winner.
    ClashAmbiguity,
    /// A descriptor could not be read or did not match its coordinate.
    InvalidArtifact,
    /// Collator: an artifact has failed dependencies.
    IncompleteArtifact,
    /// Collator: the resolution as a whole is incomplete.
    Incomplete,
    /// Work was cancelled through the abort signal.
    Aborted,
    /// A transport or filesystem failure.
    Io,
}

/// A tree structured failure description.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Reason {
    /// The category.
    pub kind: ReasonKind,
    /// Human readable description.
    pub text: String,
    /// Nested causes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<Reason>,
}

//================================================================================================
// Impls
//================================================================================================

impl Reason {
    /// Creates a reason without causes.
    pub fn new(kind: ReasonKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            reasons: Vec::new(),
        }
    }

    /// Adds a cause and returns the reason.
    pub fn caused_by(mut self, cause: Reason) -> Self {
        self.reasons.push(cause);
        self
    }

    /// Adds a cause in place.
    pub fn push(&mut self, cause: Reason) {
        self.reasons.push(cause);
    }

    /// Builds an [`ReasonKind::Io`] reason from any error and its source chain.
    pub fn from_error(err: &dyn std::error::Error) -> Self {
        let mut reason = Reason::new(ReasonKind::Io, err.to_string());
        if let Some(source) = err.source() {
            reason.push(Reason::from_error(source));
        }
        reason
    }

    /// The reasons without nested causes, depth first.
    pub fn leaves(&self) -> Vec<&Reason> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, into: &mut Vec<&'a Reason>) {
        if self.reasons.is_empty() {
            into.push(self);
        } else {
            for r in &self.reasons {
                r.collect_leaves(into);
            }
        }
    }

    /// Renders the whole tree, one reason per line, indented by depth.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&format!("[{}] {}\n", self.kind, self.text));
        for r in &self.reasons {
            r.render_into(out, depth + 1);
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl std::error::Error for Reason {}

impl fmt::Display for ReasonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReasonKind::UnresolvedDependency => "unresolved-dependency",
            ReasonKind::UnresolvedArtifact => "unresolved-artifact",
            ReasonKind::ConfigurationFailure => "configuration-failure",
            ReasonKind::EnrichingFailure => "enriching-failure",
            ReasonKind::Validation => "validation",
            ReasonKind::ClashAmbiguity => "clash-ambiguity",
            ReasonKind::InvalidArtifact => "invalid-artifact",
            ReasonKind::IncompleteArtifact => "incomplete-artifact",
            ReasonKind::Incomplete => "incomplete",
            ReasonKind::Aborted => "aborted",
            ReasonKind::Io => "io",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_are_depth_first() {
        let tree = Reason::new(ReasonKind::Incomplete, "resolution failed")
            .caused_by(
                Reason::new(ReasonKind::IncompleteArtifact, "a is incomplete")
                    .caused_by(Reason::new(ReasonKind::UnresolvedDependency, "x"))
                    .caused_by(Reason::new(ReasonKind::UnresolvedDependency, "y")),
            )
            .caused_by(Reason::new(ReasonKind::UnresolvedArtifact, "z"));

        let leaves: Vec<&str> = tree.leaves().iter().map(|r| r.text.as_str()).collect();
        assert_eq!(leaves, ["x", "y", "z"]);

        insta::assert_snapshot!(tree.render(), @r"
        [incomplete] resolution failed
          [incomplete-artifact] a is incomplete
            [unresolved-dependency] x
            [unresolved-dependency] y
          [unresolved-artifact] z
        ");
    }

    #[test]
    fn reasons_propagate_as_errors() {
        fn fails() -> anyhow::Result<()> {
            Err(Reason::new(ReasonKind::UnresolvedArtifact, "no com.acme:lib#1.0"))?;
            Ok(())
        }
        let err = fails().expect_err("a reason is an error");
        assert_eq!(err.to_string(), "no com.acme:lib#1.0");
        assert_eq!(
            err.downcast_ref::<Reason>().map(|r| r.kind),
            Some(ReasonKind::UnresolvedArtifact)
        );
    }
}
