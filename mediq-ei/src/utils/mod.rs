//! Utility modules for mediq-ei

pub mod retry;

pub use retry::{degrade, with_retry};
