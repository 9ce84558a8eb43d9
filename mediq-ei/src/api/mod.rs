//! HTTP API handlers for mediq-ei
//!
//! JSON routes for the operator commands plus a health check.

pub mod entities;
pub mod health;

pub use entities::{bulk_routes, entity_routes};
pub use health::health_routes;
