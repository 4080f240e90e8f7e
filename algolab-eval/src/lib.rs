//! algolab-eval library interface
//!
//! Algorithm contract and registry, the classifiers and metric
//! calculators, the validation harness and the versioning ledger. The
//! binary in `main.rs` is a thin CLI over these modules.

pub mod api;
pub mod classifiers;
pub mod config;
pub mod corpus;
pub mod db;
pub mod error;
pub mod init;
pub mod labels;
pub mod ledger;
pub mod metrics;
pub mod normalizer;
pub mod registry;
pub mod types;
pub mod utils;
pub mod validation;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use registry::AlgorithmRegistry;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Read-only after startup
    pub registry: Arc<AlgorithmRegistry>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: Arc<AlgorithmRegistry>) -> Self {
        Self {
            registry,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::classifier_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
