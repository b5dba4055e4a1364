//! `$skip`: drop the first `n` documents. Adjacent skips coalesce by
//! addition.

use serde_json::{json, Value};
use std::collections::BTreeSet;

use docpipe_core::modpaths::ModifiedPaths;
use docpipe_core::pipeline::Pipeline;
use docpipe_core::stage::{Dependencies, ExplainVerbosity, LocalRewrite, Stage, StageConstraints};
use docpipe_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct SkipStage {
    count: u64,
}

impl SkipStage {
    pub fn new(count: u64) -> Self {
        SkipStage { count }
    }

    pub fn parse(body: &Value) -> Result<Box<dyn Stage>> {
        let count = body.as_u64().ok_or_else(|| {
            Error::InvalidStageSpec("$skip requires a non-negative integer".to_string())
        })?;
        Ok(Box::new(SkipStage::new(count)))
    }
}

impl Stage for SkipStage {
    fn name(&self) -> &'static str {
        "$skip"
    }

    fn constraints(&self) -> StageConstraints {
        StageConstraints {
            can_swap_with_match: false,
            can_swap_with_skipping_or_limiting_stage: false,
        }
    }

    fn modified_paths(&self) -> ModifiedPaths {
        ModifiedPaths::finite_set(BTreeSet::new())
    }

    fn dependencies(&self) -> Dependencies {
        Dependencies::default()
    }

    fn serialize(&self, _verbosity: ExplainVerbosity) -> Option<Value> {
        Some(json!({ "$skip": self.count }))
    }

    /// `skip a` then `skip b` is `skip (a + b)`.
    fn local_rewrite(&self, at: usize, pipeline: &Pipeline) -> LocalRewrite {
        match pipeline.stage(at + 1).as_skipping() {
            Some(next) => LocalRewrite::CoalesceWithNext(Box::new(SkipStage::new(
                self.count.saturating_add(next),
            ))),
            None => LocalRewrite::Advance,
        }
    }

    fn as_skipping(&self) -> Option<u64> {
        Some(self.count)
    }
}
