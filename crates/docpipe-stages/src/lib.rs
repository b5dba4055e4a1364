//! # docpipe-stages: Built-in Pipeline Stages
//!
//! The concrete stages understood by the rewrite engine, plus
//! [`default_registry`], which wires their parsers into a
//! [`StageRegistry`](docpipe_core::StageRegistry) under their `$`-prefixed
//! names.
//!
//! Each stage lives in its own module and implements the
//! [`Stage`](docpipe_core::Stage) contract from `docpipe-core`; the engine
//! never knows concrete stage types, only capability views.

use docpipe_core::registry::StageParser;
use docpipe_core::{FeatureVersion, StageRegistry};

pub mod group_stage;
pub mod limit_stage;
pub mod match_stage;
pub mod predicate;
pub mod project_stage;
pub mod sample_stage;
pub mod set_stage;
pub mod skip_stage;
pub mod sort_stage;

pub use group_stage::GroupStage;
pub use limit_stage::LimitStage;
pub use match_stage::MatchStage;
pub use predicate::{CmpOp, Predicate};
pub use project_stage::ProjectStage;
pub use sample_stage::SampleStage;
pub use set_stage::SetStage;
pub use skip_stage::SkipStage;
pub use sort_stage::SortStage;

/// The registry of built-in stages. `$set` is gated behind feature
/// version 4.2; everything else is available at any version.
pub fn default_registry() -> StageRegistry {
    let builtins: &[(&str, StageParser, Option<FeatureVersion>)] = &[
        ("$group", group_stage::GroupStage::parse, None),
        ("$limit", limit_stage::LimitStage::parse, None),
        ("$match", match_stage::MatchStage::parse, None),
        ("$project", project_stage::ProjectStage::parse, None),
        ("$sample", sample_stage::SampleStage::parse, None),
        ("$set", set_stage::SetStage::parse, Some(FeatureVersion(4, 2))),
        ("$skip", skip_stage::SkipStage::parse, None),
        ("$sort", sort_stage::SortStage::parse, None),
    ];

    let mut registry = StageRegistry::new();
    for (name, parser, version) in builtins {
        registry
            .register(name, *parser, *version)
            .expect("built-in stage names are distinct");
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_registry_contents() {
        let registry = default_registry();
        assert_eq!(
            registry.stage_names(),
            vec![
                "$group", "$limit", "$match", "$project", "$sample", "$set", "$skip", "$sort"
            ]
        );
    }

    #[test]
    fn test_set_is_version_gated() {
        let registry = default_registry();
        assert!(registry
            .parse_stage(&json!({"$set": {"a": 1}}), Some(FeatureVersion(4, 0)))
            .is_err());
        assert!(registry
            .parse_stage(&json!({"$set": {"a": 1}}), Some(FeatureVersion(4, 2)))
            .is_ok());
    }
}
