//! mediq-ei: Entity Intelligence & Validation Pipeline
//!
//! Source adapters → Normalizer → Validator → Image Intelligence / Synthesis
//! Engine → apply, with the Editorial Score Engine alongside. Library
//! interface shared by the binary and the integration tests.

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod images;
pub mod knowledge;
pub mod normalizer;
pub mod pipeline;
pub mod scoring;
pub mod sources;
pub mod store;
pub mod synthesis;
pub mod types;
pub mod utils;
pub mod validator;

pub use crate::error::{ApiError, ApiResult, PipelineError, PipelineResult};

use axum::Router;
use chrono::{DateTime, Utc};
use commands::OperatorService;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OperatorService>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(service: Arc<OperatorService>) -> Self {
        Self {
            service,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::entity_routes())
        .merge(api::bulk_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
