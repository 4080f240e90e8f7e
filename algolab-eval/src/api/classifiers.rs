//! Classification proxy endpoint
//!
//! `POST /api/algolab/classifiers` runs a registered algorithm on one turn,
//! a batch of turns, or an explicit context input.

use axum::{extract::State, routing::post, Json, Router};
use tracing::{debug, info};

use crate::classifiers::llm::{ProxyRequest, ProxyResponse};
use crate::error::{ApiError, ApiResult};
use crate::types::{Algorithm, AlgorithmError, AlgorithmInput};
use crate::AppState;

/// Upper bound on `verbatims` per request
pub const MAX_BATCH: usize = 200;

/// Turn the request body into algorithm inputs
///
/// `context` wins over `verbatims`, which wins over `verbatim`.
fn inputs_from_request(request: &ProxyRequest) -> ApiResult<Vec<AlgorithmInput>> {
    if let Some(context) = &request.context {
        return Ok(vec![context.clone()]);
    }

    if let Some(verbatims) = &request.verbatims {
        if verbatims.is_empty() {
            return Err(ApiError::BadRequest("verbatims is empty".to_string()));
        }
        if verbatims.len() > MAX_BATCH {
            return Err(ApiError::BadRequest(format!(
                "At most {} verbatims per request",
                MAX_BATCH
            )));
        }
        return Ok(verbatims.iter().map(AlgorithmInput::text).collect());
    }

    match request.verbatim.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(vec![AlgorithmInput::text(text)]),
        _ => Err(ApiError::BadRequest(
            "One of verbatim, verbatims or context is required".to_string(),
        )),
    }
}

/// POST /api/algolab/classifiers
pub async fn classify(
    State(state): State<AppState>,
    Json(request): Json<ProxyRequest>,
) -> ApiResult<Json<ProxyResponse>> {
    let key = request.key.trim();
    if key.is_empty() {
        return Err(ApiError::BadRequest("key is required".to_string()));
    }

    let algorithm = state
        .registry
        .get(key)
        .ok_or_else(|| ApiError::NotFound(format!("Algorithm '{}'", key)))?;
    let inputs = inputs_from_request(&request)?;
    debug!(algorithm = key, inputs = inputs.len(), "Proxy classification request");

    let outcomes = algorithm.batch_run(&inputs).await;
    let mut results = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            Ok(result) => results.push(result),
            Err(AlgorithmError::InvalidInput(msg)) => return Err(ApiError::BadRequest(msg)),
            Err(e) => return Err(ApiError::Internal(e.to_string())),
        }
    }

    info!(algorithm = key, results = results.len(), "Proxy classification served");
    Ok(Json(ProxyResponse {
        ok: true,
        results,
        error: None,
    }))
}

pub fn classifier_routes() -> Router<AppState> {
    Router::new().route("/api/algolab/classifiers", post(classify))
}
