//! Explain serialization: every stage entry carries its `_modPaths`
//! descriptor so the rewrite pass's reasoning is visible from the outside.

use docpipe_core::stage::ExplainVerbosity;
use docpipe_stages::default_registry;
use serde_json::json;

#[test]
fn test_explain_annotates_each_stage_with_its_descriptor() {
    let pipeline = default_registry()
        .parse_pipeline(
            &[
                json!({"$set": {"b": "$a", "n": 1}}),
                json!({"$group": {"_id": "$b"}}),
                json!({"$match": {"_id": "x"}}),
            ],
            None,
        )
        .unwrap();

    let stages = pipeline.serialize_explain(ExplainVerbosity::QueryPlanner);
    assert_eq!(stages.len(), 3);

    assert_eq!(stages[0]["$set"], json!({"b": "$a", "n": 1}));
    assert_eq!(
        stages[0]["_modPaths"],
        json!({
            "type": "FiniteSet",
            "paths": ["n"],
            "renames": {"b": "a"},
        })
    );

    assert_eq!(
        stages[1]["_modPaths"],
        json!({
            "type": "AllExcept",
            "paths": [],
            "renames": {"_id": "b"},
            "computedMonotonic": {},
        })
    );

    // A filter modifies nothing.
    assert_eq!(
        stages[2]["_modPaths"],
        json!({"type": "FiniteSet", "paths": [], "renames": {}})
    );
}

#[test]
fn test_plain_serialization_has_no_annotations() {
    let pipeline = default_registry()
        .parse_pipeline(&[json!({"$skip": 3})], None)
        .unwrap();
    assert_eq!(
        pipeline.serialize(ExplainVerbosity::QueryPlanner),
        vec![json!({"$skip": 3})]
    );
}
