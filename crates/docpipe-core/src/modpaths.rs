//! # Path-Modification Descriptor
//!
//! Every stage summarizes its effect on document field paths as a
//! [`ModifiedPaths`] value. The descriptor is the single source of truth for
//! two questions the rewrite engine keeps asking:
//!
//! - **Provenance** ([`ModifiedPaths::what_happened_to`]): given a path that
//!   existed *before* the stage, under which names (if any) does its value
//!   survive *after* the stage? This drives sort-order propagation.
//! - **Pushdown naming** ([`ModifiedPaths::pushdown_name`]): given a path
//!   referenced *after* the stage, which pre-stage path (if any) holds the
//!   same value? This drives filter pushdown.
//!
//! ## The four cases
//!
//! - `NotSupported`: the stage's effect is unknown; treat it as modifying
//!   everything.
//! - `AllPaths`: the stage may rewrite the entire document.
//! - `FiniteSet`: the stage writes exactly the listed paths (plus renames);
//!   every other path is implicitly preserved under its own name.
//! - `AllExcept`: the stage rewrites everything except the listed paths,
//!   which are explicitly preserved; renames add further survivors.
//!
//! In all cases `renames` maps *new* name to *old* name, and a path in any of
//! the sets also governs its descendant sub-paths (prefix semantics), which is
//! why [`FieldPath::overlaps`] rather than equality is the comparison used
//! throughout.
//!
//! ## Broadcast-write caution
//!
//! A rename whose *target* is a dotted path denotes a broadcast write:
//! assigning to `x.y` touches every location in the document that has an `x`
//! object, so it does not mean "the value is now named `x.y`". Composition is
//! therefore restricted to renames with a single-segment target; dotted
//! targets are treated as lossy. The tests below pin this policy.

use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::path::FieldPath;

/// How a stage changes the set of addressable field paths in a document.
///
/// This is a closed sum type: every consumer matches exhaustively, so adding
/// a case is a compile-time-enforced change to every consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModifiedPaths {
    /// The stage's effect on paths is unknown. Conservatively treated as
    /// modifying everything.
    NotSupported,
    /// The stage may rewrite the entire document; no provenance survives.
    AllPaths,
    /// The stage modifies exactly `paths` and performs `renames`; every other
    /// path is implicitly preserved under its original name.
    FiniteSet {
        paths: BTreeSet<FieldPath>,
        /// New name -> old name. A given new name appears at most once.
        renames: BTreeMap<FieldPath, FieldPath>,
    },
    /// The stage modifies every path except `paths`, which are explicitly
    /// preserved. `renames` adds survivors under new names.
    AllExcept {
        paths: BTreeSet<FieldPath>,
        /// New name -> old name.
        renames: BTreeMap<FieldPath, FieldPath>,
        /// New name -> old name, for paths whose new value is a monotonic
        /// function of the named input. Carried for future sort-direction
        /// reasoning; serialized but not otherwise consumed.
        computed_monotonic: BTreeMap<FieldPath, FieldPath>,
    },
}

impl ModifiedPaths {
    /// Convenience constructor for a `FiniteSet` with no renames.
    pub fn finite_set(paths: BTreeSet<FieldPath>) -> Self {
        ModifiedPaths::FiniteSet {
            paths,
            renames: BTreeMap::new(),
        }
    }

    /// The provenance query: under which names does the value at `old_name`
    /// survive this stage?
    ///
    /// An empty result means the value is lost -- either genuinely overwritten
    /// or unknowable (`NotSupported` / `AllPaths`).
    ///
    /// Runs in time proportional to path length times the number of entries;
    /// it never inspects document contents.
    pub fn what_happened_to(&self, old_name: &FieldPath) -> Vec<FieldPath> {
        let mut new_names = Vec::new();

        match self {
            ModifiedPaths::NotSupported | ModifiedPaths::AllPaths => {
                // No information; conservatively lost.
                return new_names;
            }
            ModifiedPaths::FiniteSet { paths, renames } => {
                // Implicit preservation: old_name survives under its own name
                // iff nothing in 'paths' or the rename targets overwrites it.
                let overwritten = paths.iter().any(|p| p.overlaps(old_name))
                    || renames.keys().any(|to| to.overlaps(old_name));
                if !overwritten {
                    new_names.push(old_name.clone());
                }
            }
            ModifiedPaths::AllExcept { paths, .. } => {
                // Explicit preservation: old_name survives iff some prefix of
                // it is listed verbatim in 'paths'.
                let preserved = (1..=old_name.len()).any(|n| paths.contains(&old_name.prefix(n)));
                if preserved {
                    new_names.push(old_name.clone());
                }
            }
        }

        // In both remaining cases, a rename may have given some prefix of
        // old_name a new name: with renames { x: a.b }, the path a.b.c is now
        // also reachable as x.c. A dotted rename *target* is a broadcast
        // write and is not composed (see module docs).
        if let ModifiedPaths::FiniteSet { renames, .. }
        | ModifiedPaths::AllExcept { renames, .. } = self
        {
            for (to, from) in renames {
                if to.len() != 1 {
                    continue;
                }
                if from.is_prefix_of(old_name) {
                    let new_name = match old_name.suffix(from.len()) {
                        Some(rest) => to.concat(&rest),
                        None => to.clone(),
                    };
                    new_names.push(new_name);
                }
            }
        }

        new_names
    }

    /// The inverse question, used by filter pushdown: a predicate after this
    /// stage references `new_name`; which pre-stage path holds the same value?
    ///
    /// Returns `Some(old_name)` when the reference can be moved before the
    /// stage (possibly under a different name), `None` when the referenced
    /// value is produced or disturbed by the stage itself.
    pub fn pushdown_name(&self, new_name: &FieldPath) -> Option<FieldPath> {
        match self {
            ModifiedPaths::NotSupported | ModifiedPaths::AllPaths => None,
            ModifiedPaths::FiniteSet { paths, renames } => {
                let untouched = !paths.iter().any(|p| p.overlaps(new_name))
                    && !renames.keys().any(|to| to.overlaps(new_name));
                if untouched {
                    return Some(new_name.clone());
                }
                Self::invert_rename(renames, new_name)
            }
            ModifiedPaths::AllExcept { paths, renames, .. } => {
                let preserved = (1..=new_name.len()).any(|n| paths.contains(&new_name.prefix(n)));
                if preserved {
                    return Some(new_name.clone());
                }
                Self::invert_rename(renames, new_name)
            }
        }
    }

    /// Map a post-stage reference back through `renames` (new -> old).
    /// Only single-segment targets participate; a dotted target is a
    /// broadcast write and cannot be inverted.
    fn invert_rename(
        renames: &BTreeMap<FieldPath, FieldPath>,
        new_name: &FieldPath,
    ) -> Option<FieldPath> {
        for (to, from) in renames {
            if to.len() != 1 {
                continue;
            }
            if to.is_prefix_of(new_name) {
                return Some(match new_name.suffix(to.len()) {
                    Some(rest) => from.concat(&rest),
                    None => from.clone(),
                });
            }
        }
        None
    }

    /// Serialize the descriptor for explain output: the case tag plus the
    /// path set and rename maps.
    pub fn serialize(&self) -> Value {
        let tag = match self {
            ModifiedPaths::NotSupported => "NotSupported",
            ModifiedPaths::AllPaths => "AllPaths",
            ModifiedPaths::FiniteSet { .. } => "FiniteSet",
            ModifiedPaths::AllExcept { .. } => "AllExcept",
        };

        let mut doc = serde_json::Map::new();
        doc.insert("type".to_string(), json!(tag));

        let paths: Vec<String> = match self {
            ModifiedPaths::FiniteSet { paths, .. } | ModifiedPaths::AllExcept { paths, .. } => {
                paths.iter().map(FieldPath::to_string).collect()
            }
            _ => Vec::new(),
        };
        doc.insert("paths".to_string(), json!(paths));

        if let ModifiedPaths::FiniteSet { renames, .. }
        | ModifiedPaths::AllExcept { renames, .. } = self
        {
            let map: serde_json::Map<String, Value> = renames
                .iter()
                .map(|(to, from)| (to.to_string(), json!(from.to_string())))
                .collect();
            doc.insert("renames".to_string(), Value::Object(map));
        }

        if let ModifiedPaths::AllExcept {
            computed_monotonic, ..
        } = self
        {
            let map: serde_json::Map<String, Value> = computed_monotonic
                .iter()
                .map(|(to, from)| (to.to_string(), json!(from.to_string())))
                .collect();
            doc.insert("computedMonotonic".to_string(), Value::Object(map));
        }

        Value::Object(doc)
    }
}
