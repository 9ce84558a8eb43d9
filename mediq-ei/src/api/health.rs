//! Liveness and datastore reachability

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::store::{ListFilter, Page};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the datastore cannot be read
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub datastore: &'static str,
    /// Configured source adapters, in merge-input order
    pub sources: Vec<&'static str>,
}

/// GET /health
///
/// Always 200; a failing datastore reports `degraded`.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    let probe = state
        .service
        .store()
        .list(&ListFilter::default(), Page::new(0, 1))
        .await;
    let datastore_ok = match probe {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Health probe could not read the datastore");
            false
        }
    };

    Json(HealthResponse {
        status: if datastore_ok { "ok" } else { "degraded" },
        module: "mediq-ei",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        datastore: if datastore_ok { "ok" } else { "error" },
        sources: state.service.pipeline().source_names(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
