//! # Stage Capability Contract
//!
//! Every pipeline stage exposes the same minimal surface to the rewrite
//! engine: swap constraints, a Path-Modification Descriptor, a dependency
//! report, a serialization hook for explain output, and an optional
//! stage-private local rewrite.
//!
//! ## Capability views instead of downcasts
//!
//! The engine needs to recognize a few stage kinds among otherwise opaque
//! trait objects (the filter ahead of it, a sampling stage, a grouping stage).
//! Instead of runtime type inspection, each stage answers explicit capability
//! queries: [`Stage::as_match`] and [`Stage::as_group`] return trait views,
//! and [`Stage::as_skipping`] / [`Stage::as_limiting`] / [`Stage::is_sample`]
//! act as kind discriminants. A stage that is none of these inherits the
//! defaults and is invisible to the engine-level rewrites.
//!
//! ## Local rewrites return decisions, not mutations
//!
//! A stage's [`Stage::local_rewrite`] hook inspects the pipeline immutably and
//! returns a [`LocalRewrite`] decision; the engine applies it with explicit
//! index operations. This keeps every mutation of the stage sequence in one
//! place and makes the cursor effect of each rewrite auditable.

use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

use crate::modpaths::ModifiedPaths;
use crate::path::FieldPath;
use crate::pipeline::{self, Pipeline};
use crate::sorts::Sorts;

/// Verbosity requested for explain serialization.
///
/// Part of the serialization boundary contract: a stage may emit more (or
/// nothing) at a given level. None of the built-in stages currently vary
/// their output by verbosity -- the rewrite pass carries no execution
/// statistics -- so both levels produce the same shape today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplainVerbosity {
    QueryPlanner,
    ExecStats,
}

/// Swap legality flags, immutable for the stage's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageConstraints {
    /// May a following filter stage be moved before this stage (subject to
    /// the modified-paths split)?
    pub can_swap_with_match: bool,
    /// May a following skipping/limiting/sampling stage be moved before this
    /// stage?
    pub can_swap_with_skipping_or_limiting_stage: bool,
}

/// The field paths a stage reads.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    pub fields: BTreeSet<FieldPath>,
    /// Set when the stage needs the entire input document (e.g. an opaque
    /// transform), in which case `fields` is not exhaustive.
    pub needs_whole_document: bool,
}

/// Decision returned by a stage's local optimization hook.
#[derive(Debug)]
pub enum LocalRewrite {
    /// No stage-specific rewrite applies; the engine advances the cursor.
    Advance,
    /// Swap this stage with its immediate successor.
    SwapWithNext,
    /// Replace this stage and its immediate successor with a single stage
    /// (e.g. two adjacent limits coalescing into one).
    CoalesceWithNext(Box<dyn Stage>),
}

/// The result of splitting a filter by a stage's modified paths: the part
/// that may move before the stage and the remainder that must stay after it.
/// At least one side is always present.
pub struct MatchSplit {
    pub independent: Option<Box<dyn Stage>>,
    pub dependent: Option<Box<dyn Stage>>,
}

/// Capability view of a filter stage.
pub trait MatchCapable {
    /// True if the predicate contains a full-text-search operator. Text
    /// predicates must remain pipeline-initial and are never pushed.
    fn is_text_query(&self) -> bool;

    /// True if the predicate applies an existence check to a path that
    /// overlaps `path`.
    fn has_existence_predicate_on(&self, path: &FieldPath) -> bool;

    /// The predicate as a JSON document, used when coalescing adjacent
    /// filters.
    fn predicate_value(&self) -> Value;

    /// Split this filter into the part independent of `modified` (rewritten
    /// through the descriptor's renames where necessary) and the dependent
    /// remainder.
    fn split_by_modified(&self, modified: &ModifiedPaths) -> MatchSplit;
}

/// Capability view of a grouping stage.
pub trait GroupCapable {
    /// Number of fields making up the grouping key.
    fn id_field_count(&self) -> usize;

    /// The output path of the grouping key (present on every output
    /// document, even when the original key was absent).
    fn id_output_path(&self) -> FieldPath;
}

/// One step of a document-transformation pipeline, as seen by the rewrite
/// engine. Execution is out of scope here; the contract covers only what the
/// compile-time rewrite needs.
pub trait Stage: fmt::Debug + Send + Sync {
    /// The stage's registered name, e.g. `"$match"`.
    fn name(&self) -> &'static str;

    fn constraints(&self) -> StageConstraints;

    /// How this stage changes the set of addressable field paths. Computed on
    /// demand; must be a pure function of the stage's configuration.
    fn modified_paths(&self) -> ModifiedPaths;

    fn dependencies(&self) -> Dependencies;

    /// Serialize for explain output as a one-field document keyed by the
    /// stage name. `None` means "missing": the stage contributes nothing to
    /// the explain array.
    fn serialize(&self, verbosity: ExplainVerbosity) -> Option<Value>;

    /// Stage-private rewrite hook, consulted after the engine-level filter
    /// and sample pushdowns have declined to fire.
    fn local_rewrite(&self, _at: usize, _pipeline: &Pipeline) -> LocalRewrite {
        LocalRewrite::Advance
    }

    /// The set of sort-pattern guarantees holding immediately after this
    /// stage at position `at`. The default recurses backward through the
    /// pipeline, rewriting the previous stage's guarantees through this
    /// stage's Path-Modification Descriptor; stages that establish an order
    /// themselves (e.g. a sort stage) override this.
    fn output_sorts(&self, pipeline: &Pipeline, at: usize) -> Sorts {
        pipeline::sorts_through_stage(&self.modified_paths(), pipeline, at)
    }

    fn as_match(&self) -> Option<&dyn MatchCapable> {
        None
    }

    fn as_group(&self) -> Option<&dyn GroupCapable> {
        None
    }

    /// `Some(n)` if this stage skips the first `n` documents.
    fn as_skipping(&self) -> Option<u64> {
        None
    }

    /// `Some(n)` if this stage truncates the stream to `n` documents.
    fn as_limiting(&self) -> Option<u64> {
        None
    }

    /// True for a random-sampling stage.
    fn is_sample(&self) -> bool {
        false
    }
}
