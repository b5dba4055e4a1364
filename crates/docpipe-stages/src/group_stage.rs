//! # `$group`: Grouping and Accumulation
//!
//! Grouping replaces the entire document shape: the output carries the
//! grouping key under `_id` plus one field per accumulator, and nothing else.
//! Its Path-Modification Descriptor is therefore the `AllExcept` case with an
//! empty preserved set and a rename per key component, which is exactly what
//! lets an independent downstream filter move before the group under the
//! pre-group field names.

use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use docpipe_core::modpaths::ModifiedPaths;
use docpipe_core::path::FieldPath;
use docpipe_core::pipeline::Pipeline;
use docpipe_core::sorts::Sorts;
use docpipe_core::stage::{
    Dependencies, ExplainVerbosity, GroupCapable, Stage, StageConstraints,
};
use docpipe_core::{Error, Result};

/// The grouping key.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupKey {
    /// `{"_id": "$field"}` -- the key is a single input field, surfaced as
    /// `_id` on every output document.
    Single(FieldPath),
    /// `{"_id": {"a": "$x", "b": "$y"}}` -- a compound key; each component
    /// is surfaced as `_id.<name>`.
    Compound(BTreeMap<String, FieldPath>),
    /// `{"_id": null}` (or any literal) -- all input documents form one
    /// group.
    Constant(Value),
}

/// Accumulation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumOp {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
}

impl AccumOp {
    fn from_name(name: &str) -> Option<AccumOp> {
        Some(match name {
            "$sum" => AccumOp::Sum,
            "$avg" => AccumOp::Avg,
            "$min" => AccumOp::Min,
            "$max" => AccumOp::Max,
            "$first" => AccumOp::First,
            "$last" => AccumOp::Last,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            AccumOp::Sum => "$sum",
            AccumOp::Avg => "$avg",
            AccumOp::Min => "$min",
            AccumOp::Max => "$max",
            AccumOp::First => "$first",
            AccumOp::Last => "$last",
        }
    }
}

/// One output field computed by folding an input field over each group.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    pub op: AccumOp,
    pub source: FieldPath,
}

#[derive(Debug, Clone)]
pub struct GroupStage {
    key: GroupKey,
    accumulators: BTreeMap<String, Accumulator>,
}

/// Parse `"$field"` into a path reference; anything else is a literal.
fn parse_field_ref(value: &Value) -> Result<Option<FieldPath>> {
    match value.as_str() {
        Some(s) if s.starts_with('$') => Ok(Some(FieldPath::parse(&s[1..])?)),
        _ => Ok(None),
    }
}

impl GroupStage {
    pub fn new(key: GroupKey, accumulators: BTreeMap<String, Accumulator>) -> Self {
        GroupStage { key, accumulators }
    }

    pub fn parse(body: &Value) -> Result<Box<dyn Stage>> {
        let Some(doc) = body.as_object() else {
            return Err(Error::InvalidStageSpec(
                "$group requires an object body".to_string(),
            ));
        };
        let id = doc.get("_id").ok_or_else(|| {
            Error::InvalidStageSpec("$group requires an \"_id\" field".to_string())
        })?;

        let key = if let Some(path) = parse_field_ref(id)? {
            GroupKey::Single(path)
        } else if let Some(components) = id.as_object() {
            let mut compound = BTreeMap::new();
            for (name, value) in components {
                let path = parse_field_ref(value)?.ok_or_else(|| {
                    Error::InvalidStageSpec(format!(
                        "compound $group key component '{name}' must be a field reference"
                    ))
                })?;
                compound.insert(name.clone(), path);
            }
            if compound.is_empty() {
                return Err(Error::InvalidStageSpec(
                    "a compound $group key must have at least one component".to_string(),
                ));
            }
            GroupKey::Compound(compound)
        } else {
            GroupKey::Constant(id.clone())
        };

        let mut accumulators = BTreeMap::new();
        for (name, value) in doc {
            if name == "_id" {
                continue;
            }
            let Some(accum_doc) = value.as_object().filter(|d| d.len() == 1) else {
                return Err(Error::InvalidStageSpec(format!(
                    "accumulator '{name}' must be a one-field operator object"
                )));
            };
            let (op_name, operand) = accum_doc.iter().next().expect("one-field object");
            let op = AccumOp::from_name(op_name).ok_or_else(|| {
                Error::InvalidStageSpec(format!("unrecognized accumulator operator '{op_name}'"))
            })?;
            let source = parse_field_ref(operand)?.ok_or_else(|| {
                Error::InvalidStageSpec(format!(
                    "accumulator '{name}' requires a field-reference operand"
                ))
            })?;
            accumulators.insert(name.clone(), Accumulator { op, source });
        }

        Ok(Box::new(GroupStage::new(key, accumulators)))
    }
}

impl Stage for GroupStage {
    fn name(&self) -> &'static str {
        "$group"
    }

    fn constraints(&self) -> StageConstraints {
        StageConstraints {
            // A filter over the group key alone may run before grouping
            // (subject to the existence guard applied by the engine).
            can_swap_with_match: true,
            can_swap_with_skipping_or_limiting_stage: false,
        }
    }

    fn modified_paths(&self) -> ModifiedPaths {
        let mut renames = BTreeMap::new();
        match &self.key {
            GroupKey::Single(source) => {
                renames.insert(FieldPath::parse("_id").expect("static path"), source.clone());
            }
            GroupKey::Compound(components) => {
                for (name, source) in components {
                    let target = FieldPath::parse(&format!("_id.{name}"))
                        .expect("component names contain no empty segments");
                    renames.insert(target, source.clone());
                }
            }
            GroupKey::Constant(_) => {}
        }
        ModifiedPaths::AllExcept {
            paths: BTreeSet::new(),
            renames,
            computed_monotonic: BTreeMap::new(),
        }
    }

    fn dependencies(&self) -> Dependencies {
        let mut fields = BTreeSet::new();
        match &self.key {
            GroupKey::Single(source) => {
                fields.insert(source.clone());
            }
            GroupKey::Compound(components) => {
                fields.extend(components.values().cloned());
            }
            GroupKey::Constant(_) => {}
        }
        fields.extend(self.accumulators.values().map(|a| a.source.clone()));
        Dependencies {
            fields,
            needs_whole_document: false,
        }
    }

    fn serialize(&self, _verbosity: ExplainVerbosity) -> Option<Value> {
        let id = match &self.key {
            GroupKey::Single(source) => Value::String(format!("${source}")),
            GroupKey::Compound(components) => {
                let mut doc = Map::new();
                for (name, source) in components {
                    doc.insert(name.clone(), Value::String(format!("${source}")));
                }
                Value::Object(doc)
            }
            GroupKey::Constant(value) => value.clone(),
        };

        let mut body = Map::new();
        body.insert("_id".to_string(), id);
        for (name, accum) in &self.accumulators {
            body.insert(
                name.clone(),
                json!({ accum.op.name(): format!("${}", accum.source) }),
            );
        }
        Some(json!({ "$group": Value::Object(body) }))
    }

    /// Grouping hash-partitions its input; document order out of the stage is
    /// unspecified regardless of upstream guarantees.
    fn output_sorts(&self, _pipeline: &Pipeline, _at: usize) -> Sorts {
        Sorts::new()
    }

    fn as_group(&self) -> Option<&dyn GroupCapable> {
        Some(self)
    }
}

impl GroupCapable for GroupStage {
    fn id_field_count(&self) -> usize {
        match &self.key {
            GroupKey::Single(_) | GroupKey::Constant(_) => 1,
            GroupKey::Compound(components) => components.len(),
        }
    }

    fn id_output_path(&self) -> FieldPath {
        FieldPath::parse("_id").expect("static path")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn test_parse_single_key_with_accumulators() {
        let stage = GroupStage::parse(&json!({
            "_id": "$region",
            "total": {"$sum": "$amount"},
            "best": {"$max": "$score"}
        }))
        .unwrap();

        let deps = stage.dependencies();
        assert_eq!(
            deps.fields,
            BTreeSet::from([p("region"), p("amount"), p("score")])
        );
        let group = stage.as_group().unwrap();
        assert_eq!(group.id_field_count(), 1);
        assert_eq!(group.id_output_path(), p("_id"));
    }

    #[test]
    fn test_parse_rejects_malformed_specs() {
        assert!(GroupStage::parse(&json!("nope")).is_err());
        assert!(GroupStage::parse(&json!({"total": {"$sum": "$x"}})).is_err());
        assert!(GroupStage::parse(&json!({"_id": "$a", "t": {"$median": "$x"}})).is_err());
        assert!(GroupStage::parse(&json!({"_id": {}})).is_err());
        assert!(GroupStage::parse(&json!({"_id": "$a", "t": {"$sum": 1}})).is_err());
    }

    #[test]
    fn test_modified_paths_single_key() {
        let stage = GroupStage::parse(&json!({"_id": "$a"})).unwrap();
        let modified = stage.modified_paths();

        // The key survives under its output name; everything else is lost.
        assert_eq!(modified.what_happened_to(&p("a")), vec![p("_id")]);
        assert_eq!(modified.what_happened_to(&p("a.b")), vec![p("_id.b")]);
        assert!(modified.what_happened_to(&p("other")).is_empty());
    }

    #[test]
    fn test_modified_paths_compound_key_is_lossy() {
        // Compound key components land under dotted output names; those are
        // broadcast writes and do not compose for provenance.
        let stage = GroupStage::parse(&json!({"_id": {"x": "$a", "y": "$b"}})).unwrap();
        let modified = stage.modified_paths();
        assert!(modified.what_happened_to(&p("a")).is_empty());
        assert_eq!(stage.as_group().unwrap().id_field_count(), 2);
    }

    #[test]
    fn test_group_discards_upstream_order() {
        let stage = GroupStage::parse(&json!({"_id": "$a"})).unwrap();
        let pipeline = Pipeline::from_stages(vec![stage]);
        assert!(pipeline.output_sorts(0).is_empty());
    }

    #[test]
    fn test_serialize_round_trip() {
        let spec = json!({
            "_id": {"x": "$a.b", "y": "$c"},
            "n": {"$sum": "$amount"}
        });
        let stage = GroupStage::parse(&spec).unwrap();
        assert_eq!(
            stage.serialize(ExplainVerbosity::QueryPlanner),
            Some(json!({ "$group": spec }))
        );
    }
}
