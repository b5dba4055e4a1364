//! # docpipe-core: Document-Pipeline Rewrite Engine
//!
//! This crate implements the compile-time rewrite pass for multi-stage
//! document-transformation pipelines: deciding whether adjacent stages may be
//! reordered, and tracking how each stage alters the set of addressable field
//! paths so that sort-order reuse and predicate pushdown stay correct.
//!
//! ## Module Overview
//!
//! - **`path`**: Dotted field paths with structural overlap comparison.
//! - **`modpaths`**: The four-case Path-Modification Descriptor and the
//!   provenance query (`what_happened_to`) at the heart of every legality
//!   check.
//! - **`sorts`**: Sort patterns and sets of equivalent sort orders, with the
//!   cross-product rename used by sort propagation.
//! - **`stage`**: The capability contract every stage exposes to the engine.
//! - **`pipeline`**: The mutable stage sequence, the filter/sample pushdown
//!   engine, the fixed-point driver, and explain serialization.
//! - **`registry`**: The explicit name -> parser table for constructing
//!   stages from specification documents.
//! - **`error`**: User-facing construction errors.

pub mod error;
pub mod modpaths;
pub mod path;
pub mod pipeline;
pub mod registry;
pub mod sorts;
pub mod stage;

pub use error::{Error, Result};
pub use modpaths::ModifiedPaths;
pub use path::FieldPath;
pub use pipeline::Pipeline;
pub use registry::{FeatureVersion, StageRegistry};
pub use sorts::{SortField, SortKey, SortPattern, Sorts};
pub use stage::{
    Dependencies, ExplainVerbosity, GroupCapable, LocalRewrite, MatchCapable, MatchSplit, Stage,
    StageConstraints,
};
