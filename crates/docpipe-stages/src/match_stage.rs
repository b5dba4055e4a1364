//! # `$match`: Filter Stage
//!
//! The filter stage is mostly passive during the rewrite pass: the engine
//! itself drives filter pushdown, calling back into [`MatchCapable`] to split
//! the predicate by an upstream stage's modified paths. The stage's own local
//! rewrite only coalesces two adjacent filters into one conjunction.

use serde_json::{json, Value};

use docpipe_core::modpaths::ModifiedPaths;
use docpipe_core::path::FieldPath;
use docpipe_core::pipeline::Pipeline;
use docpipe_core::stage::{
    Dependencies, ExplainVerbosity, LocalRewrite, MatchCapable, MatchSplit, Stage, StageConstraints,
};
use docpipe_core::Result;
use std::collections::BTreeSet;

use crate::predicate::Predicate;

#[derive(Debug, Clone)]
pub struct MatchStage {
    predicate: Predicate,
}

impl MatchStage {
    pub fn new(predicate: Predicate) -> Self {
        MatchStage { predicate }
    }

    pub fn parse(body: &Value) -> Result<Box<dyn Stage>> {
        Ok(Box::new(MatchStage::new(Predicate::parse(body)?)))
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

impl Stage for MatchStage {
    fn name(&self) -> &'static str {
        "$match"
    }

    // Both flags false: the engine's filter pushdown moves filters earlier;
    // letting another filter or a sample move before this one as well would
    // re-create the configuration the pushdown just left.
    fn constraints(&self) -> StageConstraints {
        StageConstraints {
            can_swap_with_match: false,
            can_swap_with_skipping_or_limiting_stage: false,
        }
    }

    fn modified_paths(&self) -> ModifiedPaths {
        // Filtering never renames or rewrites a field.
        ModifiedPaths::finite_set(BTreeSet::new())
    }

    fn dependencies(&self) -> Dependencies {
        Dependencies {
            fields: self.predicate.paths(),
            needs_whole_document: false,
        }
    }

    fn serialize(&self, _verbosity: ExplainVerbosity) -> Option<Value> {
        Some(json!({ "$match": self.predicate.serialize() }))
    }

    /// Coalesce with an immediately following filter: `[m1, m2]` becomes a
    /// single filter over `m1 AND m2`.
    fn local_rewrite(&self, at: usize, pipeline: &Pipeline) -> LocalRewrite {
        let Some(next) = pipeline.stage(at + 1).as_match() else {
            return LocalRewrite::Advance;
        };
        // The second filter's predicate travels through a serialized round
        // trip; a parse failure here would be a defect in our own serializer.
        let other = Predicate::parse(&next.predicate_value())
            .expect("a serialized predicate always re-parses");

        let mut parts = self.predicate.conjuncts().into_iter().cloned().collect::<Vec<_>>();
        parts.extend(other.conjuncts().into_iter().cloned());
        LocalRewrite::CoalesceWithNext(Box::new(MatchStage::new(Predicate::from_conjuncts(parts))))
    }

    fn as_match(&self) -> Option<&dyn MatchCapable> {
        Some(self)
    }
}

impl MatchCapable for MatchStage {
    fn is_text_query(&self) -> bool {
        self.predicate.contains_text()
    }

    fn has_existence_predicate_on(&self, path: &FieldPath) -> bool {
        self.predicate.has_existence_predicate_on(path)
    }

    fn predicate_value(&self) -> Value {
        self.predicate.serialize()
    }

    fn split_by_modified(&self, modified: &ModifiedPaths) -> MatchSplit {
        let mut independent: Vec<Predicate> = Vec::new();
        let mut dependent: Vec<Predicate> = Vec::new();

        for conjunct in self.predicate.conjuncts() {
            match conjunct.map_paths(&|path| modified.pushdown_name(path)) {
                Some(rewritten) => independent.push(rewritten),
                None => dependent.push(conjunct.clone()),
            }
        }

        let build = |parts: Vec<Predicate>| -> Option<Box<dyn Stage>> {
            if parts.is_empty() {
                None
            } else {
                Some(Box::new(MatchStage::new(Predicate::from_conjuncts(parts))))
            }
        };

        MatchSplit {
            independent: build(independent),
            dependent: build(dependent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    fn stage(spec: Value) -> Box<dyn Stage> {
        MatchStage::parse(&spec).unwrap()
    }

    #[test]
    fn test_split_against_finite_set() {
        let filter = stage(json!({"kept": 1, "clobbered": 2}));
        let modified = ModifiedPaths::finite_set(BTreeSet::from([p("clobbered")]));

        let split = filter.as_match().unwrap().split_by_modified(&modified);
        let independent = split.independent.expect("kept clause moves");
        let dependent = split.dependent.expect("clobbered clause stays");

        assert_eq!(
            independent.serialize(ExplainVerbosity::QueryPlanner),
            Some(json!({"$match": {"kept": 1}}))
        );
        assert_eq!(
            dependent.serialize(ExplainVerbosity::QueryPlanner),
            Some(json!({"$match": {"clobbered": 2}}))
        );
    }

    #[test]
    fn test_split_rewrites_renamed_paths() {
        // The downstream name "b" was produced by renaming "a"; a pushed
        // filter must target the upstream name.
        let filter = stage(json!({"b.c": {"$gt": 5}}));
        let modified = ModifiedPaths::FiniteSet {
            paths: BTreeSet::new(),
            renames: BTreeMap::from([(p("b"), p("a"))]),
        };

        let split = filter.as_match().unwrap().split_by_modified(&modified);
        assert!(split.dependent.is_none());
        assert_eq!(
            split.independent.unwrap().serialize(ExplainVerbosity::QueryPlanner),
            Some(json!({"$match": {"a.c": {"$gt": 5}}}))
        );
    }

    #[test]
    fn test_text_predicate_never_splits_independent() {
        let filter = stage(json!({"$text": {"$search": "coffee"}}));
        let modified = ModifiedPaths::finite_set(BTreeSet::new());

        let split = filter.as_match().unwrap().split_by_modified(&modified);
        assert!(split.independent.is_none());
        assert!(split.dependent.is_some());
    }

    #[test]
    fn test_opaque_descriptor_blocks_everything() {
        let filter = stage(json!({"a": 1}));
        let split = filter
            .as_match()
            .unwrap()
            .split_by_modified(&ModifiedPaths::NotSupported);
        assert!(split.independent.is_none());
        assert!(split.dependent.is_some());
    }

    #[test]
    fn test_disjunction_moves_only_as_a_unit() {
        // One disjunct depends on a clobbered path, so the whole $or stays.
        let filter = stage(json!({"$or": [{"a": 1}, {"gone": 2}]}));
        let modified = ModifiedPaths::finite_set(BTreeSet::from([p("gone")]));

        let split = filter.as_match().unwrap().split_by_modified(&modified);
        assert!(split.independent.is_none());
        assert!(split.dependent.is_some());
    }
}
