//! Version ranges.
//!
//! ```text
//! 1.0            exactly 1.0
//! [1.0]          exactly 1.0
//! [1.0,2.0)      1.0 <= v < 2.0
//! (,3]           v <= 3
//! [1.0,)         v >= 1.0
//! [1,2),[3,4)    union of intervals
//! ^1.2           semver requirement (feature `semver`)
//! *              any version
//! ```

use std::fmt;
use std::str::FromStr;

use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::take_while;
use nom::character::complete::{char, multispace0};
use nom::combinator::{all_consuming, map, opt};
use nom::multi::separated_list1;
use nom::sequence::{delimited, tuple};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Version, VersionError};

//================================================================================================
// Types
//================================================================================================

/// One end of an [`Interval`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

/// A contiguous version interval; a missing bound is unbounded.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Interval {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

/// A range selecting acceptable versions of an artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionRange {
    /// Any version is acceptable.
    Any,
    /// Only this exact version.
    Exact(Version),
    /// Any version inside one of the intervals.
    Intervals(Vec<Interval>),
    /// A semver requirement, matched against the semver form of a version.
    #[cfg(feature = "semver")]
    Requirement(semver::VersionReq),
}

/// Interval text as scanned, before version parsing.
struct RawInterval<'a> {
    lower_inclusive: bool,
    lower: &'a str,
    upper: Option<&'a str>,
    upper_inclusive: bool,
}

//================================================================================================
// Impls
//================================================================================================

impl Interval {
    /// Tests whether `v` lies inside the interval.
    pub fn contains(&self, v: &Version) -> bool {
        let above = self.lower.as_ref().is_none_or(|b| {
            if b.inclusive {
                v >= &b.version
            } else {
                v > &b.version
            }
        });
        let below = self.upper.as_ref().is_none_or(|b| {
            if b.inclusive {
                v <= &b.version
            } else {
                v < &b.version
            }
        });
        above && below
    }

    fn from_raw(raw: RawInterval<'_>) -> Result<Self, VersionError> {
        let bound = |s: &str, inclusive| -> Result<Option<Bound>, VersionError> {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Bound {
                    version: Version::parse(s)?,
                    inclusive,
                }))
            }
        };

        match raw.upper {
            Some(upper) => Ok(Interval {
                lower: bound(raw.lower, raw.lower_inclusive)?,
                upper: bound(upper, raw.upper_inclusive)?,
            }),
            // `[1.0]` pins a single version
            None if raw.lower_inclusive && raw.upper_inclusive => {
                let pinned = bound(raw.lower, true)?;
                if pinned.is_none() {
                    return Err(VersionError::Range(String::from("[]")));
                }
                Ok(Interval {
                    lower: pinned.clone(),
                    upper: pinned,
                })
            },
            None => Err(VersionError::Range(raw.lower.to_owned())),
        }
    }
}

impl VersionRange {
    /// Tests whether a concrete version satisfies this range.
    pub fn contains(&self, v: &Version) -> bool {
        match self {
            VersionRange::Any => true,
            VersionRange::Exact(e) => e == v,
            VersionRange::Intervals(intervals) => intervals.iter().any(|i| i.contains(v)),
            #[cfg(feature = "semver")]
            VersionRange::Requirement(req) => v.to_semver().is_some_and(|s| req.matches(&s)),
        }
    }

    /// Picks the highest contained version among `candidates`.
    pub fn best_match<'a, I>(&self, candidates: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        candidates.into_iter().filter(|v| self.contains(v)).max()
    }

    /// Returns the single version this range pins, if it pins exactly one.
    pub fn exact(&self) -> Option<&Version> {
        match self {
            VersionRange::Exact(v) => Some(v),
            VersionRange::Intervals(intervals) => match intervals.as_slice() {
                [
                    Interval {
                        lower: Some(l),
                        upper: Some(u),
                    },
                ] if l.inclusive && u.inclusive && l.version == u.version => Some(&l.version),
                _ => None,
            },
            _ => None,
        }
    }

    /// Parses a range expression.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(VersionRange::Any);
        }

        if s.starts_with(['[', '(']) {
            let (_, raws) =
                all_consuming(intervals)(s).map_err(|_| VersionError::Range(s.to_owned()))?;
            let intervals = raws
                .into_iter()
                .map(Interval::from_raw)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(VersionRange::Intervals(intervals));
        }

        #[cfg(feature = "semver")]
        if s.starts_with(['^', '~', '>', '<', '=']) {
            let req = semver::VersionReq::parse(s).map_err(|_| VersionError::Semver(s.to_owned()))?;
            return Ok(VersionRange::Requirement(req));
        }

        Ok(VersionRange::Exact(Version::parse(s)?))
    }
}

impl From<Version> for VersionRange {
    fn from(v: Version) -> Self {
        VersionRange::Exact(v)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(l), Some(u)) = (&self.lower, &self.upper) {
            if l.inclusive && u.inclusive && l.version == u.version {
                return write!(f, "[{}]", l.version);
            }
        }
        match &self.lower {
            Some(b) => write!(f, "{}{}", if b.inclusive { '[' } else { '(' }, b.version)?,
            None => f.write_str("(")?,
        }
        f.write_str(",")?;
        match &self.upper {
            Some(b) => write!(f, "{}{}", b.version, if b.inclusive { ']' } else { ')' }),
            None => f.write_str(")"),
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRange::Any => f.write_str("*"),
            VersionRange::Exact(v) => write!(f, "{v}"),
            VersionRange::Intervals(intervals) => {
                for (i, interval) in intervals.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{interval}")?;
                }
                Ok(())
            },
            #[cfg(feature = "semver")]
            VersionRange::Requirement(req) => write!(f, "{req}"),
        }
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionRange::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        VersionRange::parse(&s).map_err(serde::de::Error::custom)
    }
}

//================================================================================================
// Functions
//================================================================================================

fn bound_text(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| !matches!(c, ',' | '[' | ']' | '(' | ')'))(input)
}

fn interval(input: &str) -> IResult<&str, RawInterval<'_>> {
    map(
        tuple((
            alt((map(char('['), |_| true), map(char('('), |_| false))),
            bound_text,
            opt(tuple((char(','), bound_text))),
            alt((map(char(']'), |_| true), map(char(')'), |_| false))),
        )),
        |(lower_inclusive, lower, upper, upper_inclusive)| RawInterval {
            lower_inclusive,
            lower,
            upper: upper.map(|(_, u)| u),
            upper_inclusive,
        },
    )(input)
}

fn intervals(input: &str) -> IResult<&str, Vec<RawInterval<'_>>> {
    separated_list1(delimited(multispace0, char(','), multispace0), interval)(input)
}
