//! `$sample`: uniform random selection of `size` documents. Pushed toward the
//! front of the pipeline by the engine so that per-document transformations
//! run on the sampled subset only.

use serde_json::{json, Value};
use std::collections::BTreeSet;

use docpipe_core::modpaths::ModifiedPaths;
use docpipe_core::pipeline::Pipeline;
use docpipe_core::sorts::Sorts;
use docpipe_core::stage::{Dependencies, ExplainVerbosity, Stage, StageConstraints};
use docpipe_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct SampleStage {
    size: u64,
}

impl SampleStage {
    pub fn new(size: u64) -> Self {
        SampleStage { size }
    }

    pub fn parse(body: &Value) -> Result<Box<dyn Stage>> {
        let size = body
            .get("size")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                Error::InvalidStageSpec(
                    "$sample requires a {\"size\": <non-negative integer>} body".to_string(),
                )
            })?;
        Ok(Box::new(SampleStage::new(size)))
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Stage for SampleStage {
    fn name(&self) -> &'static str {
        "$sample"
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
        Some(json!({ "$sample": { "size": self.size } }))
    }

    /// Sampling emits documents in random order, so no upstream sort
    /// guarantee survives it.
    fn output_sorts(&self, _pipeline: &Pipeline, _at: usize) -> Sorts {
        Sorts::new()
    }

    fn is_sample(&self) -> bool {
        true
    }
}
