//! # Field Paths
//!
//! A [`FieldPath`] addresses a location in a document as a dotted sequence of
//! named segments (e.g. `a.b.c`). Paths are the currency of the rewrite engine:
//! stage descriptors report which paths they write, filter predicates report
//! which paths they read, and sort patterns are keyed by paths.
//!
//! ## Overlap, not equality
//!
//! The central comparison primitive is [`FieldPath::overlaps`], not string
//! equality. Writing to `a.b` also disturbs `a.b.c` (a descendant) and `a`
//! (an ancestor), so two paths interfere whenever one is a prefix of the other
//! at the shorter length. `a.b` and `a.c` diverge after the first segment and
//! do not overlap. Every legality check in the engine is phrased in terms of
//! overlap for exactly this reason.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A non-empty dotted field path, compared structurally segment by segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Build a path from pre-split segments. Fails on an empty list or an
    /// empty segment (`"a..b"` is not a valid dotted path).
    pub fn from_segments(segments: Vec<String>) -> Result<Self, Error> {
        if segments.is_empty() {
            return Err(Error::InvalidFieldPath("empty field path".to_string()));
        }
        if segments.iter().any(String::is_empty) {
            return Err(Error::InvalidFieldPath(format!(
                "empty segment in field path '{}'",
                segments.join(".")
            )));
        }
        Ok(Self { segments })
    }

    /// Parse a dotted path string like `"a.b.c"`.
    pub fn parse(path: &str) -> Result<Self, Error> {
        Self::from_segments(path.split('.').map(str::to_string).collect())
    }

    /// Number of segments in the path. Always at least 1.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false: the constructors reject empty paths, so every
    /// `FieldPath` has at least one segment.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The leading `n` segments as a new path. `n` must be in `1..=len()`.
    pub fn prefix(&self, n: usize) -> FieldPath {
        assert!(n >= 1 && n <= self.segments.len(), "prefix length out of range");
        FieldPath {
            segments: self.segments[..n].to_vec(),
        }
    }

    /// The segments after the first `n`, or `None` if nothing remains.
    pub fn suffix(&self, n: usize) -> Option<FieldPath> {
        if n >= self.segments.len() {
            return None;
        }
        Some(FieldPath {
            segments: self.segments[n..].to_vec(),
        })
    }

    /// True if `self` is a prefix of `other` (including equality).
    pub fn is_prefix_of(&self, other: &FieldPath) -> bool {
        self.segments.len() <= other.segments.len()
            && self.segments == other.segments[..self.segments.len()]
    }

    /// Two paths overlap iff one is a prefix of the other (including equality).
    ///
    /// `a.b` overlaps `a.b.c` because modifying `a.b.c` also modifies `a.b`;
    /// `a.b` and `a.c` do not overlap because they diverge after `a`.
    pub fn overlaps(&self, other: &FieldPath) -> bool {
        let n = self.segments.len().min(other.segments.len());
        self.segments[..n] == other.segments[..n]
    }

    /// Append another path's segments to this one.
    pub fn concat(&self, other: &FieldPath) -> FieldPath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        FieldPath { segments }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse(".a").is_err());
        assert!(FieldPath::parse("a.").is_err());
    }

    #[test]
    fn test_overlap_prefix_and_divergence() {
        assert!(p("a.b").overlaps(&p("a.b.c")));
        assert!(p("a.b.c").overlaps(&p("a.b")));
        assert!(p("a").overlaps(&p("a")));
        assert!(!p("a.b").overlaps(&p("a.c")));
        assert!(!p("a.b.x").overlaps(&p("a.y")));
    }

    #[test]
    fn test_prefix_suffix_concat() {
        let path = p("a.b.c");
        assert_eq!(path.prefix(2), p("a.b"));
        assert_eq!(path.suffix(1), Some(p("b.c")));
        assert_eq!(path.suffix(3), None);
        assert_eq!(p("x").concat(&p("b.c")), p("x.b.c"));
    }

    #[test]
    fn test_is_prefix_of() {
        assert!(p("a").is_prefix_of(&p("a.b")));
        assert!(p("a.b").is_prefix_of(&p("a.b")));
        assert!(!p("a.b").is_prefix_of(&p("a")));
        assert!(!p("a.b").is_prefix_of(&p("a.c")));
    }

    #[test]
    fn test_display_round_trip() {
        let path = p("a.b.c");
        assert_eq!(path.to_string(), "a.b.c");
        assert_eq!(FieldPath::parse(&path.to_string()).unwrap(), path);
    }

    /// Strategy generating short dotted paths over a tiny alphabet so that
    /// prefix relationships actually occur.
    fn arb_path() -> impl Strategy<Value = FieldPath> {
        prop::collection::vec(prop::sample::select(vec!["a", "b", "c"]), 1..4)
            .prop_map(|segs| {
                FieldPath::from_segments(segs.into_iter().map(str::to_string).collect()).unwrap()
            })
    }

    proptest! {
        #[test]
        fn prop_overlap_symmetric(x in arb_path(), y in arb_path()) {
            prop_assert_eq!(x.overlaps(&y), y.overlaps(&x));
        }

        #[test]
        fn prop_overlap_reflexive(x in arb_path()) {
            prop_assert!(x.overlaps(&x));
        }

        #[test]
        fn prop_prefix_implies_overlap(x in arb_path(), y in arb_path()) {
            if x.is_prefix_of(&y) {
                prop_assert!(x.overlaps(&y));
            }
        }
    }
}
