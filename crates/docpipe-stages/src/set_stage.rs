//! # `$set`: Add or Overwrite Fields
//!
//! Each assignment is either a field-to-field copy (`{"b": "$a"}`), which the
//! descriptor records as a rename so provenance flows through it, or a
//! literal write, which only clobbers its target. All other fields pass
//! through untouched, making this the canonical `FiniteSet` stage.

use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use docpipe_core::modpaths::ModifiedPaths;
use docpipe_core::path::FieldPath;
use docpipe_core::pipeline::Pipeline;
use docpipe_core::stage::{Dependencies, ExplainVerbosity, LocalRewrite, Stage, StageConstraints};
use docpipe_core::{Error, Result};

/// The right-hand side of one assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum SetExpr {
    /// `"$other.field"` -- copy the value at another path.
    FieldRef(FieldPath),
    /// Any non-reference value, written verbatim.
    Literal(Value),
}

#[derive(Debug, Clone)]
pub struct SetStage {
    assignments: BTreeMap<FieldPath, SetExpr>,
}

impl SetStage {
    pub fn new(assignments: BTreeMap<FieldPath, SetExpr>) -> Self {
        SetStage { assignments }
    }

    pub fn parse(body: &Value) -> Result<Box<dyn Stage>> {
        let Some(doc) = body.as_object() else {
            return Err(Error::InvalidStageSpec(
                "$set requires an object body".to_string(),
            ));
        };
        if doc.is_empty() {
            return Err(Error::InvalidStageSpec(
                "$set requires at least one assignment".to_string(),
            ));
        }

        let mut assignments = BTreeMap::new();
        for (target, value) in doc {
            let target = FieldPath::parse(target)?;
            let expr = match value.as_str() {
                Some(s) if s.starts_with('$') => SetExpr::FieldRef(FieldPath::parse(&s[1..])?),
                _ => SetExpr::Literal(value.clone()),
            };
            assignments.insert(target, expr);
        }
        Ok(Box::new(SetStage::new(assignments)))
    }
}

impl Stage for SetStage {
    fn name(&self) -> &'static str {
        "$set"
    }

    fn constraints(&self) -> StageConstraints {
        StageConstraints {
            can_swap_with_match: true,
            can_swap_with_skipping_or_limiting_stage: true,
        }
    }

    fn modified_paths(&self) -> ModifiedPaths {
        let mut paths = BTreeSet::new();
        let mut renames = BTreeMap::new();
        for (target, expr) in &self.assignments {
            match expr {
                SetExpr::FieldRef(source) => {
                    renames.insert(target.clone(), source.clone());
                }
                SetExpr::Literal(_) => {
                    paths.insert(target.clone());
                }
            }
        }
        ModifiedPaths::FiniteSet { paths, renames }
    }

    fn dependencies(&self) -> Dependencies {
        let fields = self
            .assignments
            .values()
            .filter_map(|expr| match expr {
                SetExpr::FieldRef(source) => Some(source.clone()),
                SetExpr::Literal(_) => None,
            })
            .collect();
        Dependencies {
            fields,
            needs_whole_document: false,
        }
    }

    fn serialize(&self, _verbosity: ExplainVerbosity) -> Option<Value> {
        let mut doc = Map::new();
        for (target, expr) in &self.assignments {
            let value = match expr {
                SetExpr::FieldRef(source) => Value::String(format!("${source}")),
                SetExpr::Literal(value) => value.clone(),
            };
            doc.insert(target.to_string(), value);
        }
        Some(json!({ "$set": Value::Object(doc) }))
    }

    /// A per-document transform commutes with skipping: transforming then
    /// dropping the first `n` equals dropping then transforming, and the
    /// latter does less work.
    fn local_rewrite(&self, at: usize, pipeline: &Pipeline) -> LocalRewrite {
        if pipeline.stage(at + 1).as_skipping().is_some() {
            LocalRewrite::SwapWithNext
        } else {
            LocalRewrite::Advance
        }
    }
}
