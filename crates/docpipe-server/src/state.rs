//! # Application State
//!
//! Shared state available to all HTTP request handlers, created once at
//! startup and shared via `Arc` across concurrent requests.
//!
//! The stage registry is stateless after construction, so a single instance
//! serves every request; each request builds its own [`Pipeline`] and there
//! is no cross-request pipeline state.
//!
//! [`Pipeline`]: docpipe_core::Pipeline

use std::sync::Arc;

use docpipe_core::{FeatureVersion, StageRegistry};

/// Server-level rewrite-service configuration.
pub struct ServiceConfig {
    /// The feature version advertised by this deployment. Requests may cap
    /// themselves lower, never higher.
    pub max_feature_version: FeatureVersion,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_feature_version: FeatureVersion(4, 2),
        }
    }
}

/// Shared application state, accessible via Axum's State extractor.
pub struct AppState {
    /// All built-in stage parsers.
    pub registry: Arc<StageRegistry>,
    /// Deployment configuration (feature-version ceiling).
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new AppState with the built-in stage registry and default
    /// configuration.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(docpipe_stages::default_registry()),
            config: ServiceConfig::default(),
        }
    }
}
