//! # Error Types
//!
//! User-facing errors raised while constructing a pipeline: malformed stage
//! specifications, unknown stage names, feature-gated stages used below their
//! minimum version, and misplaced text predicates. These abort pipeline
//! construction and surface a descriptive message to the caller.
//!
//! Internal invariant violations (e.g. a filter split that produces neither an
//! independent nor a dependent part) are logic defects, not bad input. They
//! panic with a diagnostic rather than being represented here -- the rewrite
//! engine has no partial-failure mode.

use thiserror::Error;

use crate::registry::FeatureVersion;

/// Errors surfaced to the caller during pipeline construction.
#[derive(Debug, Error)]
pub enum Error {
    /// The stage specification object was structurally malformed.
    #[error("invalid stage specification: {0}")]
    InvalidStageSpec(String),

    /// No parser is registered under this stage name.
    #[error("unrecognized pipeline stage name: '{0}'")]
    UnknownStage(String),

    /// The stage requires a newer feature version than the request allows.
    #[error("{stage} is not allowed in the current feature compatibility version (requires {required})")]
    FeatureNotAllowed {
        stage: String,
        required: FeatureVersion,
    },

    /// A text-search predicate appeared anywhere but the first stage.
    #[error("a text-search predicate is only allowed as the first pipeline stage")]
    TextPredicateMisplaced,

    /// Two parsers were registered under the same stage name.
    #[error("duplicate stage parser registered for '{0}'")]
    DuplicateParser(String),

    /// A dotted path string was empty or contained an empty segment.
    #[error("invalid field path: {0}")]
    InvalidFieldPath(String),

    /// A match predicate document could not be understood.
    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),
}

pub type Result<T> = std::result::Result<T, Error>;
