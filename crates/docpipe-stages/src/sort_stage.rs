//! # `$sort`: Establish an Order
//!
//! The sort stage is where sort guarantees originate: instead of propagating
//! its predecessor's guarantees, it asserts its own pattern. Key order in the
//! specification is significant (`{"a": 1, "b": -1}` sorts by `a` first).

use serde_json::{json, Value};
use std::collections::BTreeSet;

use docpipe_core::modpaths::ModifiedPaths;
use docpipe_core::path::FieldPath;
use docpipe_core::pipeline::Pipeline;
use docpipe_core::sorts::{SortField, SortKey, SortPattern, Sorts};
use docpipe_core::stage::{Dependencies, ExplainVerbosity, Stage, StageConstraints};
use docpipe_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct SortStage {
    pattern: SortPattern,
    /// Output field names for metadata keys, in pattern order, so the stage
    /// serializes back to its input form.
    meta_names: Vec<(usize, String)>,
}

impl SortStage {
    pub fn new(pattern: SortPattern) -> Self {
        SortStage {
            pattern,
            meta_names: Vec::new(),
        }
    }

    pub fn parse(body: &Value) -> Result<Box<dyn Stage>> {
        let Some(doc) = body.as_object() else {
            return Err(Error::InvalidStageSpec(
                "$sort requires an object body".to_string(),
            ));
        };
        if doc.is_empty() {
            return Err(Error::InvalidStageSpec(
                "$sort requires at least one key".to_string(),
            ));
        }

        let mut keys = Vec::new();
        let mut meta_names = Vec::new();
        for (field, direction) in doc {
            // {"score": {"$meta": "textScore"}} sorts by a computed metadata
            // value rather than a document field.
            if let Some(meta) = direction.get("$meta").and_then(Value::as_str) {
                meta_names.push((keys.len(), field.clone()));
                keys.push(SortKey {
                    field: SortField::Meta(meta.to_string()),
                    ascending: false,
                });
                continue;
            }
            let ascending = match direction.as_i64() {
                Some(1) => true,
                Some(-1) => false,
                _ => {
                    return Err(Error::InvalidStageSpec(format!(
                        "sort direction for '{field}' must be 1 or -1"
                    )));
                }
            };
            keys.push(SortKey {
                field: SortField::Path(FieldPath::parse(field)?),
                ascending,
            });
        }
        Ok(Box::new(SortStage {
            pattern: SortPattern(keys),
            meta_names,
        }))
    }
}

impl Stage for SortStage {
    fn name(&self) -> &'static str {
        "$sort"
    }

    fn constraints(&self) -> StageConstraints {
        StageConstraints {
            // Filtering first and then sorting the survivors is always
            // equivalent, and cheaper.
            can_swap_with_match: true,
            can_swap_with_skipping_or_limiting_stage: false,
        }
    }

    fn modified_paths(&self) -> ModifiedPaths {
        // Reordering documents changes no field of any document.
        ModifiedPaths::finite_set(BTreeSet::new())
    }

    fn dependencies(&self) -> Dependencies {
        Dependencies {
            fields: self.pattern.paths(),
            needs_whole_document: false,
        }
    }

    fn serialize(&self, _verbosity: ExplainVerbosity) -> Option<Value> {
        let mut doc = serde_json::Map::new();
        for (i, key) in self.pattern.keys().iter().enumerate() {
            match &key.field {
                SortField::Path(path) => {
                    doc.insert(path.to_string(), json!(if key.ascending { 1 } else { -1 }));
                }
                SortField::Meta(meta) => {
                    let name = self
                        .meta_names
                        .iter()
                        .find(|(at, _)| *at == i)
                        .map(|(_, name)| name.clone())
                        .unwrap_or_else(|| meta.clone());
                    doc.insert(name, json!({ "$meta": meta }));
                }
            }
        }
        Some(json!({ "$sort": Value::Object(doc) }))
    }

    /// Sort guarantees start here; upstream guarantees are irrelevant once
    /// the stream is re-sorted.
    fn output_sorts(&self, _pipeline: &Pipeline, _at: usize) -> Sorts {
        Sorts::single(self.pattern.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn test_parse_preserves_key_order_and_direction() {
        let stage = SortStage::parse(&json!({"b": -1, "a": 1})).unwrap();
        let sorts = stage.output_sorts(&Pipeline::new(), 0);
        let pattern = sorts.sorts.iter().next().unwrap();
        assert_eq!(
            pattern.keys(),
            &[SortKey::desc(p("b")), SortKey::asc(p("a"))]
        );
    }

    #[test]
    fn test_parse_meta_key() {
        let stage = SortStage::parse(&json!({"score": {"$meta": "textScore"}})).unwrap();
        assert!(stage.dependencies().fields.is_empty());
        // Serializes back to the input form, not the internal pattern form.
        assert_eq!(
            stage.serialize(ExplainVerbosity::QueryPlanner),
            Some(json!({"$sort": {"score": {"$meta": "textScore"}}}))
        );
    }

    #[test]
    fn test_serialize_round_trip() {
        let spec = json!({"a": 1, "b.c": -1});
        let stage = SortStage::parse(&spec).unwrap();
        assert_eq!(
            stage.serialize(ExplainVerbosity::QueryPlanner),
            Some(json!({"$sort": spec}))
        );
    }

    #[test]
    fn test_parse_rejects_bad_directions() {
        assert!(SortStage::parse(&json!({"a": 2})).is_err());
        assert!(SortStage::parse(&json!({"a": "asc"})).is_err());
        assert!(SortStage::parse(&json!({})).is_err());
    }
}
