//! End-to-end rewrite-pass tests over pipelines built from the default
//! registry: filter and sample pushdown, the grouping existence guard, and
//! stage coalescing.

use docpipe_core::stage::ExplainVerbosity;
use docpipe_core::{Error, Pipeline};
use docpipe_stages::default_registry;
use serde_json::{json, Value};

fn optimized(specs: &[Value]) -> Vec<Value> {
    let registry = default_registry();
    let mut pipeline: Pipeline = registry.parse_pipeline(specs, None).unwrap();
    pipeline.optimize();
    pipeline.serialize(ExplainVerbosity::QueryPlanner)
}

#[test]
fn test_match_moves_before_rename_under_the_old_name() {
    let result = optimized(&[
        json!({"$set": {"b": "$a"}}),
        json!({"$match": {"b.c": {"$gt": 5}}}),
    ]);
    assert_eq!(
        result,
        vec![
            json!({"$match": {"a.c": {"$gt": 5}}}),
            json!({"$set": {"b": "$a"}}),
        ]
    );
}

#[test]
fn test_match_splits_across_group() {
    // The key clause moves before the group under the pre-group name; the
    // accumulator clause has no pre-group counterpart and stays behind.
    let result = optimized(&[
        json!({"$group": {"_id": "$region", "total": {"$sum": "$amount"}}}),
        json!({"$match": {"_id": "north", "total": {"$gte": 100}}}),
    ]);
    assert_eq!(
        result,
        vec![
            json!({"$match": {"region": "north"}}),
            json!({"$group": {"_id": "$region", "total": {"$sum": "$amount"}}}),
            json!({"$match": {"total": {"$gte": 100}}}),
        ]
    );
}

#[test]
fn test_existence_check_on_group_key_stays_put() {
    // Grouping materializes "_id" on every output document, including groups
    // whose input key was absent; the existence check is not equivalent
    // before the group.
    let specs = vec![
        json!({"$group": {"_id": "$a"}}),
        json!({"$match": {"_id": {"$exists": true}}}),
    ];
    assert_eq!(optimized(&specs), specs);
}

#[test]
fn test_match_moves_before_sort() {
    let result = optimized(&[
        json!({"$sort": {"a": 1}}),
        json!({"$match": {"a": {"$gt": 0}}}),
    ]);
    assert_eq!(
        result,
        vec![
            json!({"$match": {"a": {"$gt": 0}}}),
            json!({"$sort": {"a": 1}}),
        ]
    );
}

#[test]
fn test_match_on_literal_write_stays_put() {
    let specs = vec![
        json!({"$set": {"flag": true}}),
        json!({"$match": {"flag": true}}),
    ];
    assert_eq!(optimized(&specs), specs);
}

#[test]
fn test_sample_moves_before_projection() {
    let result = optimized(&[
        json!({"$project": {"a": 1}}),
        json!({"$sample": {"size": 10}}),
    ]);
    assert_eq!(
        result,
        vec![
            json!({"$sample": {"size": 10}}),
            json!({"$project": {"_id": 1, "a": 1}}),
        ]
    );
}

#[test]
fn test_adjacent_matches_coalesce() {
    let result = optimized(&[json!({"$match": {"a": 1}}), json!({"$match": {"b": 2}})]);
    assert_eq!(
        result,
        vec![json!({"$match": {"$and": [{"a": 1}, {"b": 2}]}})]
    );
}

#[test]
fn test_skip_and_limit_coalesce() {
    let result = optimized(&[
        json!({"$skip": 2}),
        json!({"$skip": 3}),
        json!({"$limit": 10}),
        json!({"$limit": 4}),
    ]);
    assert_eq!(result, vec![json!({"$skip": 5}), json!({"$limit": 4})]);
}

#[test]
fn test_transform_swaps_with_skip() {
    let result = optimized(&[json!({"$set": {"flag": true}}), json!({"$skip": 4})]);
    assert_eq!(
        result,
        vec![json!({"$skip": 4}), json!({"$set": {"flag": true}})]
    );
}

#[test]
fn test_text_match_stays_first_and_is_rejected_elsewhere() {
    // In first position the text filter is legal and never relocated.
    let specs = vec![
        json!({"$match": {"$text": {"$search": "coffee"}}}),
        json!({"$sort": {"a": 1}}),
    ];
    assert_eq!(optimized(&specs), specs);

    // Anywhere else it is a construction error.
    let registry = default_registry();
    let err = registry
        .parse_pipeline(
            &[
                json!({"$sort": {"a": 1}}),
                json!({"$match": {"$text": {"$search": "coffee"}}}),
            ],
            None,
        )
        .unwrap_err();
    assert!(matches!(err, Error::TextPredicateMisplaced));
}

#[test]
fn test_combined_pipeline_reaches_fixed_point() {
    // A longer pipeline exercising several rewrites at once; the pass must
    // terminate and leave a stable result.
    let result = optimized(&[
        json!({"$set": {"b": "$a"}}),
        json!({"$match": {"b": {"$gt": 1}}}),
        json!({"$match": {"c": 2}}),
        json!({"$skip": 1}),
        json!({"$skip": 2}),
    ]);
    assert_eq!(
        result,
        vec![
            json!({"$match": {"$and": [{"a": {"$gt": 1}}, {"c": 2}]}}),
            json!({"$skip": 3}),
            json!({"$set": {"b": "$a"}}),
        ]
    );

    // Optimizing the optimized form changes nothing.
    let again = optimized(&result);
    assert_eq!(again, result);
}
