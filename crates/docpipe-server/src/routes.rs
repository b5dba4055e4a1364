//! # HTTP Route Handlers
//!
//! Axum route handlers for the rewrite service.
//!
//! ## Request Flow
//!
//! Both rewrite endpoints share the same core (`run_rewrite`):
//!
//! 1. **Parse**: Construct a pipeline from the stage specifications, applying
//!    the requested feature-version cap and placement validation.
//! 2. **Optimize**: Run the rewrite pass to a fixed point.
//! 3. **Serialize**: Return the optimized stage list; the explain endpoint
//!    additionally annotates each stage with its `_modPaths` descriptor.
//!
//! ## Error Handling
//!
//! - 400 Bad Request: malformed pipeline specifications (unknown stage,
//!   invalid predicate, feature-version violation, misplaced text filter).
//! - Internal invariant violations abort the request task; they are defects,
//!   not user errors, and are never mapped to a response.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use docpipe_core::stage::ExplainVerbosity;
use docpipe_core::{FeatureVersion, Pipeline};

use crate::state::AppState;

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /stages — list the registered stage names.
pub async fn list_stages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "stages": state.registry.stage_names() }))
}

/// Request body shared by the rewrite endpoints.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteRequest {
    /// The pipeline as an array of one-field stage specifications.
    pub pipeline: Vec<Value>,
    /// Optional feature-version cap, e.g. `"4.0"`. Defaults to the server's
    /// configured ceiling.
    pub feature_version: Option<String>,
    /// Explain verbosity; only consulted by the explain endpoint.
    pub verbosity: Option<String>,
}

/// POST /optimize — rewrite a pipeline and return the optimized stage list.
pub async fn optimize(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RewriteRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let pipeline = run_rewrite(&state, &request)?;
    Ok(Json(json!({
        "pipeline": pipeline.serialize(ExplainVerbosity::QueryPlanner)
    })))
}

/// POST /explain — rewrite a pipeline and return the annotated explain form.
pub async fn explain(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RewriteRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let verbosity = parse_verbosity(request.verbosity.as_deref())?;
    let pipeline = run_rewrite(&state, &request)?;
    Ok(Json(json!({
        "stages": pipeline.serialize_explain(verbosity)
    })))
}

/// Parse, validate, and optimize the requested pipeline.
fn run_rewrite(
    state: &AppState,
    request: &RewriteRequest,
) -> Result<Pipeline, (StatusCode, String)> {
    let cap = match request.feature_version.as_deref() {
        Some(raw) => {
            let requested = parse_feature_version(raw)?;
            // A request may lower the ceiling but never raise it past the
            // deployment's own version.
            requested.min(state.config.max_feature_version)
        }
        None => state.config.max_feature_version,
    };

    let mut pipeline = state
        .registry
        .parse_pipeline(&request.pipeline, Some(cap))
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    debug!(stages = pipeline.len(), feature_version = %cap, "rewriting pipeline");
    pipeline.optimize();
    Ok(pipeline)
}

fn parse_feature_version(raw: &str) -> Result<FeatureVersion, (StatusCode, String)> {
    let parsed = raw.split_once('.').and_then(|(major, minor)| {
        Some(FeatureVersion(major.parse().ok()?, minor.parse().ok()?))
    });
    parsed.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("invalid feature version '{raw}': expected \"<major>.<minor>\""),
        )
    })
}

fn parse_verbosity(raw: Option<&str>) -> Result<ExplainVerbosity, (StatusCode, String)> {
    match raw {
        None | Some("queryPlanner") => Ok(ExplainVerbosity::QueryPlanner),
        Some("executionStats") => Ok(ExplainVerbosity::ExecStats),
        Some(other) => Err((
            StatusCode::BAD_REQUEST,
            format!("invalid verbosity '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feature_version() {
        assert_eq!(parse_feature_version("4.2").unwrap(), FeatureVersion(4, 2));
        assert!(parse_feature_version("4").is_err());
        assert!(parse_feature_version("4.x").is_err());
        assert!(parse_feature_version("").is_err());
    }

    #[test]
    fn test_request_cap_never_exceeds_deployment_ceiling() {
        let state = AppState::new();
        let request = RewriteRequest {
            pipeline: vec![json!({"$set": {"a": 1}})],
            feature_version: Some("9.9".to_string()),
            verbosity: None,
        };
        // $set is gated at 4.2; a 9.9 request on a 4.2 server still parses
        // because the effective cap is min(9.9, 4.2) = 4.2.
        assert!(run_rewrite(&state, &request).is_ok());

        let low = RewriteRequest {
            feature_version: Some("4.0".to_string()),
            ..request
        };
        assert!(run_rewrite(&state, &low).is_err());
    }
}
