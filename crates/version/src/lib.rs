//! # Artifact Versions
//!
//! Opaque, totally ordered artifact versions and the ranges that select them.
//!
//! Artifact versions in the wild are rarely valid semantic versions: `1.0`,
//! `2.0.0.Final`, `1.4-rc2` and `3.1-SNAPSHOT` all occur. [`Version`] accepts
//! any of them, orders numeric components first and falls back to a qualifier
//! ranking afterwards.
//!
//! ## Ordering
//!
//! Numeric components compare pairwise, missing components count as zero, so
//! `1.0` and `1.0.0` are the same version. Qualifiers rank as
//!
//! ```text
//! alpha < beta < milestone < rc < snapshot < release < sp < anything else
//! ```
//!
//! where "release" is the absent qualifier (or `ga`/`final`/`release`). Within
//! a rank a trailing number decides (`rc1 < rc2`), then the text itself.
//!
//! ## Ranges
//!
//! See [`VersionRange`]; ranges use the bracket notation `[1.0,2.0)` and, with
//! the `semver` feature, also accept semver requirements such as `^1.2`.
//!
//! ## Example
//!
//! ```
//! use depot_version::{Version, VersionRange};
//!
//! let range: VersionRange = "[1.0,2.0)".parse().unwrap();
//! let versions: Vec<Version> = ["0.9", "1.0", "1.5-rc1", "1.5", "2.0"]
//!     .iter()
//!     .map(|v| v.parse().unwrap())
//!     .collect();
//!
//! assert_eq!(range.best_match(&versions).unwrap().to_string(), "1.5");
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

mod range;

pub use range::{Bound, Interval, VersionRange};

#[cfg(test)]
mod test;

//================================================================================================
// Types
//================================================================================================

/// A parsed artifact version.
///
/// Equality, ordering and hashing all follow the normalized form; `Display`
/// reproduces the text the version was parsed from.
#[derive(Clone, Debug)]
pub struct Version {
    raw: String,
    numbers: Vec<u64>,
    qualifier: Option<String>,
}

/// Errors raised while parsing versions or ranges.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The version string was empty.
    #[error("empty version string")]
    Empty,
    /// The version has no leading numeric component.
    #[error("version `{0}` does not start with a numeric component")]
    NotNumeric(String),
    /// A range expression could not be parsed.
    #[error("invalid version range `{0}`")]
    Range(String),
    /// A semver requirement could not be parsed.
    #[cfg(feature = "semver")]
    #[error("invalid semver requirement `{0}`")]
    Semver(String),
}

/// Coarse ordering classes of version qualifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum QualifierRank {
    Alpha,
    Beta,
    Milestone,
    ReleaseCandidate,
    Snapshot,
    Release,
    ServicePack,
    Unknown,
}

//================================================================================================
// Impls
//================================================================================================

impl Version {
    /// Parses a version string.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(VersionError::Empty);
        }

        let (head, tail) = match raw.split_once('-') {
            Some((h, t)) => (h, Some(t)),
            None => (raw, None),
        };

        let mut numbers = Vec::new();
        let mut rest = Vec::new();
        for component in head.split('.') {
            match component.parse::<u64>() {
                Ok(n) if rest.is_empty() => numbers.push(n),
                _ => rest.push(component),
            }
        }

        if numbers.is_empty() {
            return Err(VersionError::NotNumeric(raw.to_owned()));
        }

        let mut qualifier = rest.join(".");
        if let Some(tail) = tail {
            if !qualifier.is_empty() {
                qualifier.push('-');
            }
            qualifier.push_str(tail);
        }

        Ok(Version {
            raw: raw.to_owned(),
            numbers,
            qualifier: (!qualifier.is_empty()).then_some(qualifier),
        })
    }

    /// The numeric components as written.
    pub fn numbers(&self) -> &[u64] {
        &self.numbers
    }

    /// The qualifier following the numeric components, if any.
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// Whether this is a snapshot (moving) version.
    pub fn is_snapshot(&self) -> bool {
        self.qualifier
            .as_deref()
            .is_some_and(|q| q.to_ascii_lowercase().ends_with("snapshot"))
    }

    /// Returns the numeric components without trailing zeros.
    fn normalized_numbers(&self) -> &[u64] {
        let end = self
            .numbers
            .iter()
            .rposition(|n| *n != 0)
            .map_or(0, |i| i + 1);
        &self.numbers[..end]
    }

    fn rank(&self) -> (QualifierRank, u64, String) {
        match self.qualifier.as_deref() {
            None => (QualifierRank::Release, 0, String::new()),
            Some(q) => {
                let lower = q.to_ascii_lowercase();
                let rank = QualifierRank::of(&lower);
                let digits: String = lower
                    .trim_end_matches("-snapshot")
                    .chars()
                    .rev()
                    .take_while(char::is_ascii_digit)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();
                let number = digits.parse().unwrap_or(0);
                let text = if rank == QualifierRank::Release {
                    String::new()
                } else {
                    lower
                };
                (rank, number, text)
            },
        }
    }

    /// Converts into a semantic version for matching against semver requirements.
    ///
    /// The first three numeric components become major, minor and patch; a
    /// non-release qualifier becomes the pre-release tag when it is a valid one.
    #[cfg(feature = "semver")]
    pub fn to_semver(&self) -> Option<semver::Version> {
        let at = |i: usize| self.numbers.get(i).copied().unwrap_or(0);
        let mut v = semver::Version::new(at(0), at(1), at(2));
        if let Some(q) = &self.qualifier {
            if QualifierRank::of(&q.to_ascii_lowercase()) != QualifierRank::Release {
                v.pre = semver::Prerelease::new(q).ok()?;
            }
        }
        Some(v)
    }
}

impl QualifierRank {
    fn of(lower: &str) -> Self {
        let stripped = lower.strip_suffix("-snapshot").unwrap_or(lower);
        let base = stripped.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '-');
        match base {
            "alpha" | "a" => QualifierRank::Alpha,
            "beta" | "b" => QualifierRank::Beta,
            "milestone" | "m" => QualifierRank::Milestone,
            "rc" | "cr" => QualifierRank::ReleaseCandidate,
            "snapshot" => QualifierRank::Snapshot,
            "" | "ga" | "final" | "release" => QualifierRank::Release,
            "sp" => QualifierRank::ServicePack,
            _ => QualifierRank::Unknown,
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.numbers.len().max(other.numbers.len());
        for i in 0..len {
            let a = self.numbers.get(i).copied().unwrap_or(0);
            let b = other.numbers.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized_numbers().hash(state);
        self.rank().hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(feature = "semver")]
impl From<semver::Version> for Version {
    fn from(v: semver::Version) -> Self {
        // a formatted semver version always has numeric components
        let raw = v.to_string();
        let qualifier = (!v.pre.is_empty()).then(|| v.pre.to_string());
        Version {
            raw,
            numbers: vec![v.major, v.minor, v.patch],
            qualifier,
        }
    }
}
