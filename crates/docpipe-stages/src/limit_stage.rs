//! `$limit`: truncate the stream to `n` documents. Adjacent limits coalesce
//! to the smaller bound.

use serde_json::{json, Value};
use std::collections::BTreeSet;

use docpipe_core::modpaths::ModifiedPaths;
use docpipe_core::pipeline::Pipeline;
use docpipe_core::stage::{Dependencies, ExplainVerbosity, LocalRewrite, Stage, StageConstraints};
use docpipe_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct LimitStage {
    count: u64,
}

impl LimitStage {
    pub fn new(count: u64) -> Self {
        LimitStage { count }
    }

    pub fn parse(body: &Value) -> Result<Box<dyn Stage>> {
        let count = body.as_u64().ok_or_else(|| {
            Error::InvalidStageSpec("$limit requires a non-negative integer".to_string())
        })?;
        Ok(Box::new(LimitStage::new(count)))
    }
}

impl Stage for LimitStage {
    fn name(&self) -> &'static str {
        "$limit"
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
        Some(json!({ "$limit": self.count }))
    }

    /// `limit a` then `limit b` is `limit min(a, b)`.
    fn local_rewrite(&self, at: usize, pipeline: &Pipeline) -> LocalRewrite {
        match pipeline.stage(at + 1).as_limiting() {
            Some(next) => {
                LocalRewrite::CoalesceWithNext(Box::new(LimitStage::new(self.count.min(next))))
            }
            None => LocalRewrite::Advance,
        }
    }

    fn as_limiting(&self) -> Option<u64> {
        Some(self.count)
    }
}
