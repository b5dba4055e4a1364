//! # Stage Registry
//!
//! An explicit name -> parser table used to construct stages from one-field
//! specification objects like `{"$match": {...}}`. The registry is a plain
//! value built at startup and passed by reference to parsing calls -- there
//! is no process-wide mutable state, and registering the same name twice is
//! a construction-time error rather than a global assertion.
//!
//! Entries may carry a minimum feature version; parsing a gated stage under a
//! lower requested version is a user error surfaced at the request boundary.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::stage::Stage;

/// A feature-compatibility version, ordered lexicographically
/// (major, minor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FeatureVersion(pub u32, pub u32);

impl fmt::Display for FeatureVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0, self.1)
    }
}

/// Parses the body of a one-field stage specification into a stage object.
pub type StageParser = fn(&Value) -> Result<Box<dyn Stage>>;

struct Registration {
    parser: StageParser,
    required_min_version: Option<FeatureVersion>,
}

/// Name -> parser table, constructed once and then read-only.
#[derive(Default)]
pub struct StageRegistry {
    parsers: BTreeMap<String, Registration>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser under `name`, optionally gated behind a minimum
    /// feature version. Duplicate registration is an error.
    pub fn register(
        &mut self,
        name: &str,
        parser: StageParser,
        required_min_version: Option<FeatureVersion>,
    ) -> Result<()> {
        if self.parsers.contains_key(name) {
            return Err(Error::DuplicateParser(name.to_string()));
        }
        self.parsers.insert(
            name.to_string(),
            Registration {
                parser,
                required_min_version,
            },
        );
        Ok(())
    }

    /// Names of all registered stages, in sorted order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.parsers.keys().map(String::as_str).collect()
    }

    /// Construct a stage from a one-field specification object.
    pub fn parse_stage(
        &self,
        spec: &Value,
        max_version: Option<FeatureVersion>,
    ) -> Result<Box<dyn Stage>> {
        let Some(doc) = spec.as_object() else {
            return Err(Error::InvalidStageSpec(
                "a pipeline stage specification must be an object".to_string(),
            ));
        };
        if doc.len() != 1 {
            return Err(Error::InvalidStageSpec(
                "a pipeline stage specification object must contain exactly one field".to_string(),
            ));
        }
        let (name, body) = doc.iter().next().expect("one-field object");

        let registration = self
            .parsers
            .get(name)
            .ok_or_else(|| Error::UnknownStage(name.clone()))?;

        if let (Some(max), Some(required)) = (max_version, registration.required_min_version) {
            if required > max {
                return Err(Error::FeatureNotAllowed {
                    stage: name.clone(),
                    required,
                });
            }
        }

        (registration.parser)(body)
    }

    /// Construct a whole pipeline, validating stage placement rules that span
    /// stages: a text-search predicate is only allowed in the first stage.
    pub fn parse_pipeline(
        &self,
        specs: &[Value],
        max_version: Option<FeatureVersion>,
    ) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new();
        for (i, spec) in specs.iter().enumerate() {
            let stage = self.parse_stage(spec, max_version)?;
            if i != 0 {
                if let Some(filter) = stage.as_match() {
                    if filter.is_text_query() {
                        return Err(Error::TextPredicateMisplaced);
                    }
                }
            }
            pipeline.push(stage);
        }
        Ok(pipeline)
    }
}
