//! # Sort-Order Model
//!
//! A [`SortPattern`] is an ordered tuple of sort keys describing one guaranteed
//! output ordering. A [`Sorts`] value is a *set* of such patterns, all
//! simultaneously valid for the same stream -- a stage may guarantee more than
//! one equivalent ordering when several fields carry the same value (e.g.
//! after `{ $set: { b: "$a" } }`, sort-by-`a` and sort-by-`b` are both true).
//!
//! ## Renaming
//!
//! [`Sorts::rename`] rewrites every pattern through an old-name -> new-names
//! mapping produced from a stage's Path-Modification Descriptor. Because a
//! single field may survive under several names, a pattern with parts that
//! each have several alternatives expands to the cross product of
//! substitutions; a pattern is dropped entirely if any part maps to the empty
//! list. Arity is preserved exactly -- there is no partial substitution.

use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::path::FieldPath;

/// What a single sort key orders by: a document field or stage-computed
/// metadata (e.g. a text-search score).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortField {
    Path(FieldPath),
    Meta(String),
}

/// One component of a sort pattern.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortKey {
    pub field: SortField,
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(path: FieldPath) -> Self {
        SortKey {
            field: SortField::Path(path),
            ascending: true,
        }
    }

    pub fn desc(path: FieldPath) -> Self {
        SortKey {
            field: SortField::Path(path),
            ascending: false,
        }
    }
}

/// An ordered, fixed-arity tuple of sort keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortPattern(pub Vec<SortKey>);

impl SortPattern {
    pub fn keys(&self) -> &[SortKey] {
        &self.0
    }

    /// Every distinct field path referenced by this pattern.
    pub fn paths(&self) -> BTreeSet<FieldPath> {
        self.0
            .iter()
            .filter_map(|key| match &key.field {
                SortField::Path(path) => Some(path.clone()),
                SortField::Meta(_) => None,
            })
            .collect()
    }

    /// Serialize as the familiar one-document form, e.g. `{"a": 1, "b": -1}`.
    pub fn serialize(&self) -> Value {
        let mut doc = serde_json::Map::new();
        for key in &self.0 {
            match &key.field {
                SortField::Path(path) => {
                    doc.insert(path.to_string(), json!(if key.ascending { 1 } else { -1 }));
                }
                SortField::Meta(meta) => {
                    doc.insert(format!("$meta:{meta}"), json!(if key.ascending { 1 } else { -1 }));
                }
            }
        }
        Value::Object(doc)
    }
}

/// A set of alternative sort patterns, all valid for the same stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sorts {
    pub sorts: BTreeSet<SortPattern>,
}

impl Sorts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(pattern: SortPattern) -> Self {
        let mut sorts = BTreeSet::new();
        sorts.insert(pattern);
        Sorts { sorts }
    }

    pub fn is_empty(&self) -> bool {
        self.sorts.is_empty()
    }

    /// Every distinct field path referenced by any pattern.
    pub fn paths(&self) -> BTreeSet<FieldPath> {
        self.sorts.iter().flat_map(|s| s.paths()).collect()
    }

    /// Rewrite every pattern through `old_to_new`.
    ///
    /// Each path key must have an entry in the map; an empty alternative list
    /// (or a missing entry) drops every pattern that uses that path. Metadata
    /// keys pass through unchanged. If the pattern is `{a, b}` and the map has
    /// `b -> [x, y]`, the result contains `{a, x}` and `{a, y}`.
    pub fn rename(&self, old_to_new: &BTreeMap<FieldPath, Vec<FieldPath>>) -> Sorts {
        let mut result = Sorts::new();
        for pattern in &self.sorts {
            let mut prefix = Vec::with_capacity(pattern.0.len());
            rename_into(&mut prefix, pattern, old_to_new, &mut result);
        }
        result
    }

    /// Serialize for explain output: an array of sort-pattern documents.
    pub fn serialize(&self) -> Value {
        Value::Array(self.sorts.iter().map(SortPattern::serialize).collect())
    }
}

/// Emit into `result` every full renaming of `original` that extends `prefix`.
///
/// Each recursion level substitutes one sort key; the cross product of
/// alternatives is enumerated by iterating the candidates for the key at
/// `prefix.len()`. `prefix` is modified in place and always restored before
/// returning, so the caller's view is unchanged.
fn rename_into(
    prefix: &mut Vec<SortKey>,
    original: &SortPattern,
    old_to_new: &BTreeMap<FieldPath, Vec<FieldPath>>,
    result: &mut Sorts,
) {
    let i = prefix.len();
    if i == original.0.len() {
        // Every key has been substituted; arity is preserved by construction.
        result.sorts.insert(SortPattern(prefix.clone()));
        return;
    }

    let key = &original.0[i];
    match &key.field {
        SortField::Meta(_) => {
            prefix.push(key.clone());
            rename_into(prefix, original, old_to_new, result);
            prefix.pop();
        }
        SortField::Path(path) => {
            // A missing entry means the caller could not account for this
            // path; treat it like a lost path and drop the pattern.
            let Some(alternatives) = old_to_new.get(path) else {
                return;
            };
            for new_path in alternatives {
                prefix.push(SortKey {
                    field: SortField::Path(new_path.clone()),
                    ascending: key.ascending,
                });
                rename_into(prefix, original, old_to_new, result);
                prefix.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    fn pattern(keys: &[&str]) -> SortPattern {
        SortPattern(keys.iter().map(|k| SortKey::asc(p(k))).collect())
    }

    #[test]
    fn test_rename_identity() {
        let sorts = Sorts::single(pattern(&["a", "b"]));
        let map = BTreeMap::from([(p("a"), vec![p("a")]), (p("b"), vec![p("b")])]);
        assert_eq!(sorts.rename(&map), sorts);
    }

    #[test]
    fn test_rename_drops_lost_paths() {
        let sorts = Sorts::single(pattern(&["a", "b"]));
        let map = BTreeMap::from([(p("a"), vec![]), (p("b"), vec![p("b")])]);
        assert!(sorts.rename(&map).is_empty());
    }

    #[test]
    fn test_rename_cross_product() {
        // b -> [x] and c -> [y, z]: {a, b, c} becomes {a, x, y} and {a, x, z}.
        let sorts = Sorts::single(pattern(&["a", "b", "c"]));
        let map = BTreeMap::from([
            (p("a"), vec![p("a")]),
            (p("b"), vec![p("x")]),
            (p("c"), vec![p("y"), p("z")]),
        ]);
        let renamed = sorts.rename(&map);
        assert_eq!(renamed.sorts.len(), 2);
        assert!(renamed.sorts.contains(&pattern(&["a", "x", "y"])));
        assert!(renamed.sorts.contains(&pattern(&["a", "x", "z"])));
        // Arity preserved exactly.
        assert!(renamed.sorts.iter().all(|s| s.0.len() == 3));
    }

    #[test]
    fn test_rename_preserves_direction() {
        let sorts = Sorts::single(SortPattern(vec![SortKey::desc(p("a"))]));
        let map = BTreeMap::from([(p("a"), vec![p("b")])]);
        let renamed = sorts.rename(&map);
        let only = renamed.sorts.iter().next().unwrap();
        assert_eq!(only.0[0].field, SortField::Path(p("b")));
        assert!(!only.0[0].ascending);
    }

    #[test]
    fn test_meta_keys_pass_through() {
        let sorts = Sorts::single(SortPattern(vec![
            SortKey {
                field: SortField::Meta("textScore".to_string()),
                ascending: false,
            },
            SortKey::asc(p("a")),
        ]));
        let map = BTreeMap::from([(p("a"), vec![p("b")])]);
        let renamed = sorts.rename(&map);
        let only = renamed.sorts.iter().next().unwrap();
        assert_eq!(only.0[0].field, SortField::Meta("textScore".to_string()));
        assert_eq!(only.0[1].field, SortField::Path(p("b")));
    }

    #[test]
    fn test_paths_collection_and_serialize() {
        let sorts = Sorts::single(pattern(&["a", "b.c"]));
        assert_eq!(sorts.paths(), BTreeSet::from([p("a"), p("b.c")]));
        let doc = sorts.serialize();
        assert_eq!(doc[0]["a"], 1);
        assert_eq!(doc[0]["b.c"], 1);
    }
}
