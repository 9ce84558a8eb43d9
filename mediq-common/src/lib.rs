//! # mediq Common Library
//!
//! Shared code for the mediq services:
//! - Error type used across crates
//! - Bootstrap TOML configuration and root folder resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
