//! Error types for mediq-ei
//!
//! - [`ProviderError`]: one external call failed. Retried, then degraded to "no result".
//! - [`PipelineError`]: surfaced to callers (`NotFound` aborts an entity's pipeline,
//!   `WriteConflict` is left to caller-level retry).
//! - [`ApiError`]: HTTP mapping for the operator routes.
//!
//! A rejected entity is not an error; it is `EntityStatus::Rejected`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::types::EntityId;

/// External provider call failure
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Call exceeded its timeout
    #[error("{provider}: timed out after {timeout_ms} ms")]
    Timeout { provider: String, timeout_ms: u64 },

    /// Transport-level failure
    #[error("{provider}: network error: {message}")]
    Network { provider: String, message: String },

    /// Non-success HTTP status
    #[error("{provider}: HTTP {status}")]
    Http { provider: String, status: u16 },

    /// Response could not be decoded
    #[error("{provider}: parse error: {message}")]
    Parse { provider: String, message: String },

    /// Provider is not configured (e.g. missing API key)
    #[error("{provider}: not configured")]
    NotConfigured { provider: String },

    /// Retries exhausted
    #[error("{provider}: unavailable after {attempts} attempts ({last})")]
    Unavailable {
        provider: String,
        attempts: u32,
        last: String,
    },
}

impl ProviderError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Parse { .. } | Self::NotConfigured { .. } | Self::Unavailable { .. } => false,
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            Self::Timeout { provider, .. }
            | Self::Network { provider, .. }
            | Self::Http { provider, .. }
            | Self::Parse { provider, .. }
            | Self::NotConfigured { provider }
            | Self::Unavailable { provider, .. } => provider,
        }
    }

    pub(crate) fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                provider: provider.to_string(),
                timeout_ms: 0,
            }
        } else if err.is_decode() {
            Self::Parse {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                provider: provider.to_string(),
                status: status.as_u16(),
            }
        } else {
            Self::Network {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Pipeline and datastore errors surfaced to callers
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Entity or id unresolvable (no retry)
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// External call failed after bounded retry
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(#[from] ProviderError),

    /// Datastore rejected a write due to concurrent mutation
    #[error("Write conflict on {id}: expected version {expected}")]
    WriteConflict { id: EntityId, expected: i64 },

    /// Invalid request or configuration value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Datastore failure
    #[error("Datastore error: {0}")]
    Store(#[from] sqlx::Error),

    /// Stored document could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// mediq-common error
    #[error("Common error: {0}")]
    Common(#[from] mediq_common::Error),
}

impl PipelineError {
    pub fn not_found(id: EntityId) -> Self {
        Self::NotFound(id.to_string())
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. concurrent write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(msg) => ApiError::NotFound(msg),
            PipelineError::InvalidInput(msg) => ApiError::BadRequest(msg),
            e @ PipelineError::WriteConflict { .. } => ApiError::Conflict(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
