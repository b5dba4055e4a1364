//! # Pipeline and the Reordering Engine
//!
//! The [`Pipeline`] owns an ordered, index-addressed sequence of stages and
//! runs the compile-time rewrite pass over it. The pass is single-threaded
//! and synchronous: it runs once, to a fixed point, before any document flows
//! through the pipeline.
//!
//! ## The rewrite loop
//!
//! [`Pipeline::optimize`] walks a cursor over the sequence. At each position
//! [`Pipeline::optimize_at`] attempts two engine-level rewrites in order:
//!
//! 1. **Filter pushdown** (`push_match_before`): if the next stage is a
//!    filter, split its predicate into the part independent of this stage's
//!    modified paths and the dependent remainder, and move the independent
//!    part before this stage.
//! 2. **Sample pushdown** (`push_sample_before`): if the next stage is a
//!    random-sampling stage and this stage tolerates it, relocate the sample
//!    before this stage.
//!
//! If neither fires, the stage's own [`Stage::local_rewrite`] hook is
//! consulted. Every mutation is an explicit index operation (insert, remove,
//! swap) with a stated effect on subsequent indices, and every rewrite step
//! returns the next index to examine.
//!
//! ## Termination
//!
//! Every successful rewrite either moves a stage strictly earlier or shrinks
//! the sequence, so the cursor's backtracking is bounded and the loop reaches
//! a pass with zero rewrites after finitely many steps. A generous iteration
//! bound backs this argument: exceeding it is a logic defect and fatal.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::modpaths::ModifiedPaths;
use crate::sorts::Sorts;
use crate::stage::{ExplainVerbosity, LocalRewrite, Stage};

/// An ordered, mutable sequence of exclusively-owned stages.
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_stages(stages: Vec<Box<dyn Stage>>) -> Self {
        Pipeline { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, at: usize) -> &dyn Stage {
        self.stages[at].as_ref()
    }

    pub fn stages(&self) -> impl Iterator<Item = &dyn Stage> {
        self.stages.iter().map(|s| s.as_ref())
    }

    pub fn push(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    /// Insert `stage` at `at`; stages at `at` and beyond shift one position
    /// later.
    pub fn insert(&mut self, at: usize, stage: Box<dyn Stage>) {
        self.stages.insert(at, stage);
    }

    /// Remove and return the stage at `at`; stages beyond it shift one
    /// position earlier.
    pub fn remove(&mut self, at: usize) -> Box<dyn Stage> {
        self.stages.remove(at)
    }

    /// Run the rewrite pass to a fixed point.
    pub fn optimize(&mut self) {
        let len = self.stages.len();
        // Each step either advances the cursor or performs a rewrite that
        // strictly decreases a well-founded measure; this bound only trips on
        // a logic defect.
        let budget = 8 * (len + 2) * (len + 2);
        let mut iterations = 0usize;

        debug!(stages = len, "starting pipeline rewrite pass");

        let mut at = 0;
        while at < self.stages.len() {
            iterations += 1;
            assert!(
                iterations <= budget,
                "pipeline rewrite failed to reach a fixed point after {iterations} steps"
            );
            at = self.optimize_at(at);
        }

        debug!(
            stages = self.stages.len(),
            iterations, "pipeline rewrite reached fixed point"
        );
    }

    /// Attempt the engine-level rewrites at `at`, falling back to the stage's
    /// own hook. Returns the next position to examine: `at + 1` when nothing
    /// changed, an earlier position after a successful rewrite so preceding
    /// stages can react.
    pub fn optimize_at(&mut self, at: usize) -> usize {
        assert!(at < self.stages.len(), "rewrite cursor out of bounds");

        if at + 1 < self.stages.len()
            && (self.push_match_before(at) || self.push_sample_before(at))
        {
            // The relocated stage now sits at `at`; back up one more so the
            // stage before it gets a chance to react as well.
            return at.saturating_sub(1);
        }

        if at + 1 >= self.stages.len() {
            return at + 1;
        }

        match self.stages[at].local_rewrite(at, self) {
            LocalRewrite::Advance => at + 1,
            LocalRewrite::SwapWithNext => {
                trace!(at, stage = self.stages[at].name(), "local rewrite: swap with next");
                self.stages.swap(at, at + 1);
                at.saturating_sub(1)
            }
            LocalRewrite::CoalesceWithNext(merged) => {
                trace!(at, stage = merged.name(), "local rewrite: coalesce with next");
                self.stages.remove(at + 1);
                self.stages[at] = merged;
                // Re-examine the merged stage; it may coalesce again.
                at
            }
        }
    }

    /// Filter pushdown: try to move (part of) the filter at `at + 1` before
    /// the stage at `at`. Returns true if the sequence changed.
    fn push_match_before(&mut self, at: usize) -> bool {
        if !self.stages[at].constraints().can_swap_with_match {
            return false;
        }

        let split = {
            let Some(next_match) = self.stages[at + 1].as_match() else {
                return false;
            };
            // A text predicate must already be the first stage; never push it.
            if next_match.is_text_query() {
                return false;
            }
            // A single-key group makes its output key present on every
            // document, including those whose original key was absent, so an
            // existence check on it must not move before the group.
            if let Some(group) = self.stages[at].as_group() {
                if group.id_field_count() == 1
                    && next_match.has_existence_predicate_on(&group.id_output_path())
                {
                    trace!(at, "filter pushdown blocked by group existence guard");
                    return false;
                }
            }
            next_match.split_by_modified(&self.stages[at].modified_paths())
        };

        // A split that produces neither part is a logic defect, not bad input.
        assert!(
            split.independent.is_some() || split.dependent.is_some(),
            "filter split produced neither an independent nor a dependent part"
        );

        let Some(independent) = split.independent else {
            return false;
        };

        trace!(at, stage = self.stages[at].name(), "pushing filter before stage");

        // Replace [stage, match] with [independent, stage, dependent?].
        self.stages.remove(at + 1);
        self.stages.insert(at, independent);
        if let Some(dependent) = split.dependent {
            self.stages.insert(at + 2, dependent);
        }
        true
    }

    /// Sample pushdown: relocate the sampling stage at `at + 1` before the
    /// stage at `at`. Unconditional once the capability allows it -- sampling
    /// commutes with any per-document transformation.
    fn push_sample_before(&mut self, at: usize) -> bool {
        if !self.stages[at]
            .constraints()
            .can_swap_with_skipping_or_limiting_stage
            || !self.stages[at + 1].is_sample()
        {
            return false;
        }

        trace!(at, stage = self.stages[at].name(), "pushing sample before stage");

        let sample = self.stages.remove(at + 1);
        self.stages.insert(at, sample);
        true
    }

    /// The sort-pattern guarantees holding immediately after the stage at
    /// `at`. Pure; safe to recompute at any time during the pass.
    pub fn output_sorts(&self, at: usize) -> Sorts {
        self.stages[at].output_sorts(self, at)
    }

    /// Serialize every stage for explain output, injecting the `_modPaths`
    /// descriptor into each entry. Stages that serialize to "missing"
    /// contribute nothing.
    pub fn serialize_explain(&self, verbosity: ExplainVerbosity) -> Vec<Value> {
        let mut array = Vec::new();
        for stage in &self.stages {
            let Some(mut entry) = stage.serialize(verbosity) else {
                continue;
            };
            if let Value::Object(doc) = &mut entry {
                doc.insert("_modPaths".to_string(), stage.modified_paths().serialize());
            }
            array.push(entry);
        }
        array
    }

    /// Serialize every stage without the explain extras, e.g. for returning
    /// an optimized pipeline to the caller.
    pub fn serialize(&self, verbosity: ExplainVerbosity) -> Vec<Value> {
        self.stages
            .iter()
            .filter_map(|stage| stage.serialize(verbosity))
            .collect()
    }
}

/// Default backward recursion for sort propagation (spec'd behavior of
/// `Stage::output_sorts`).
///
/// Base case: position 0 has no upstream guarantee. Opaque descriptors
/// (`NotSupported` / `AllPaths`) cannot be trusted and yield nothing. The
/// general case obtains the previous stage's guarantees and rewrites every
/// referenced path through this stage's provenance; patterns whose paths are
/// lost are dropped, and multiple surviving names expand to the cross product
/// of substitutions.
pub fn sorts_through_stage(
    modified: &ModifiedPaths,
    pipeline: &Pipeline,
    at: usize,
) -> Sorts {
    if at == 0 {
        return Sorts::new();
    }

    match modified {
        ModifiedPaths::NotSupported | ModifiedPaths::AllPaths => return Sorts::new(),
        ModifiedPaths::FiniteSet { .. } | ModifiedPaths::AllExcept { .. } => {}
    }

    let prev_sorts = pipeline.output_sorts(at - 1);
    if prev_sorts.is_empty() {
        return prev_sorts;
    }

    let mut old_to_new: BTreeMap<_, _> = BTreeMap::new();
    for path in prev_sorts.paths() {
        let survivors = modified.what_happened_to(&path);
        old_to_new.insert(path, survivors);
    }

    prev_sorts.rename(&old_to_new)
}
