//! # `$project`: Inclusion and Exclusion Projections
//!
//! An inclusion projection keeps only the listed paths (plus `_id`, unless
//! excluded) and maps to the `AllExcept` descriptor; an exclusion projection
//! removes the listed paths and maps to `FiniteSet`. Mixing the two modes in
//! one specification is rejected, with the conventional carve-out that
//! `"_id": 0` may accompany inclusions.

use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

use docpipe_core::modpaths::ModifiedPaths;
use docpipe_core::path::FieldPath;
use docpipe_core::pipeline::Pipeline;
use docpipe_core::stage::{Dependencies, ExplainVerbosity, LocalRewrite, Stage, StageConstraints};
use docpipe_core::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Keep exactly these paths; everything else is dropped.
    Include(BTreeSet<FieldPath>),
    /// Drop exactly these paths; everything else passes through.
    Exclude(BTreeSet<FieldPath>),
}

#[derive(Debug, Clone)]
pub struct ProjectStage {
    projection: Projection,
}

impl ProjectStage {
    pub fn new(projection: Projection) -> Self {
        ProjectStage { projection }
    }

    pub fn parse(body: &Value) -> Result<Box<dyn Stage>> {
        let Some(doc) = body.as_object() else {
            return Err(Error::InvalidStageSpec(
                "$project requires an object body".to_string(),
            ));
        };

        let mut includes = BTreeSet::new();
        let mut excludes = BTreeSet::new();
        for (field, value) in doc {
            let path = FieldPath::parse(field)?;
            let included = match value {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                _ => {
                    return Err(Error::InvalidStageSpec(format!(
                        "projection for '{field}' must be 0/1 or a boolean"
                    )));
                }
            };
            if included {
                includes.insert(path);
            } else {
                excludes.insert(path);
            }
        }

        let id = FieldPath::parse("_id").expect("static path");
        let projection = if !includes.is_empty() {
            // "_id": 0 is the only exclusion allowed alongside inclusions;
            // inclusion mode keeps _id by default.
            if excludes.iter().any(|path| *path != id) {
                return Err(Error::InvalidStageSpec(
                    "cannot mix included and excluded fields in one $project".to_string(),
                ));
            }
            if excludes.is_empty() {
                includes.insert(id);
            }
            Projection::Include(includes)
        } else if !excludes.is_empty() {
            Projection::Exclude(excludes)
        } else {
            return Err(Error::InvalidStageSpec(
                "$project requires at least one field".to_string(),
            ));
        };

        Ok(Box::new(ProjectStage::new(projection)))
    }
}

impl Stage for ProjectStage {
    fn name(&self) -> &'static str {
        "$project"
    }

    fn constraints(&self) -> StageConstraints {
        StageConstraints {
            can_swap_with_match: true,
            can_swap_with_skipping_or_limiting_stage: true,
        }
    }

    fn modified_paths(&self) -> ModifiedPaths {
        match &self.projection {
            Projection::Include(paths) => ModifiedPaths::AllExcept {
                paths: paths.clone(),
                renames: Default::default(),
                computed_monotonic: Default::default(),
            },
            Projection::Exclude(paths) => ModifiedPaths::finite_set(paths.clone()),
        }
    }

    fn dependencies(&self) -> Dependencies {
        match &self.projection {
            Projection::Include(paths) => Dependencies {
                fields: paths.clone(),
                needs_whole_document: false,
            },
            // An exclusion passes through everything it does not name; its
            // input is the whole document.
            Projection::Exclude(_) => Dependencies {
                fields: BTreeSet::new(),
                needs_whole_document: true,
            },
        }
    }

    fn serialize(&self, _verbosity: ExplainVerbosity) -> Option<Value> {
        let (paths, flag) = match &self.projection {
            Projection::Include(paths) => (paths, 1),
            Projection::Exclude(paths) => (paths, 0),
        };
        let mut doc = Map::new();
        for path in paths {
            doc.insert(path.to_string(), json!(flag));
        }
        Some(json!({ "$project": Value::Object(doc) }))
    }

    fn local_rewrite(&self, at: usize, pipeline: &Pipeline) -> LocalRewrite {
        if pipeline.stage(at + 1).as_skipping().is_some() {
            LocalRewrite::SwapWithNext
        } else {
            LocalRewrite::Advance
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn test_inclusion_keeps_id_by_default() {
        let stage = ProjectStage::parse(&json!({"a": 1, "b.c": true})).unwrap();
        let modified = stage.modified_paths();
        assert_eq!(modified.what_happened_to(&p("a")), vec![p("a")]);
        assert_eq!(modified.what_happened_to(&p("_id")), vec![p("_id")]);
        assert!(modified.what_happened_to(&p("z")).is_empty());
    }

    #[test]
    fn test_inclusion_with_id_suppressed() {
        let stage = ProjectStage::parse(&json!({"a": 1, "_id": 0})).unwrap();
        let modified = stage.modified_paths();
        assert_eq!(modified.what_happened_to(&p("a")), vec![p("a")]);
        assert!(modified.what_happened_to(&p("_id")).is_empty());
    }

    #[test]
    fn test_exclusion_passes_the_rest() {
        let stage = ProjectStage::parse(&json!({"secret": 0})).unwrap();
        let modified = stage.modified_paths();
        assert!(modified.what_happened_to(&p("secret")).is_empty());
        assert_eq!(modified.what_happened_to(&p("a")), vec![p("a")]);
        assert!(stage.dependencies().needs_whole_document);
    }

    #[test]
    fn test_mixed_modes_rejected() {
        assert!(ProjectStage::parse(&json!({"a": 1, "b": 0})).is_err());
        assert!(ProjectStage::parse(&json!({})).is_err());
        assert!(ProjectStage::parse(&json!({"a": "yes"})).is_err());
    }
}
