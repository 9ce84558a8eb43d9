//! Configuration for mediq-ei
//!
//! One TOML file carries the shared bootstrap section plus pipeline settings.
//! Every threshold the pipeline uses lives here, nothing is hardcoded in the
//! components themselves.
//!
//! API keys resolve ENV → TOML (ENV wins).

use mediq_common::config::BootstrapConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable for the metadata provider API key
pub const METADATA_KEY_ENV_VAR: &str = "MEDIQ_METADATA_API_KEY";

/// Environment variable for the stock image provider API key
pub const STOCK_KEY_ENV_VAR: &str = "MEDIQ_STOCK_API_KEY";

/// Full mediq-ei configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EiConfig {
    #[serde(flatten)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub tables: TableOverrides,
}

/// External provider endpoints, keys and rate limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_metadata_base_url")]
    pub metadata_base_url: String,
    #[serde(default)]
    pub metadata_api_key: Option<String>,
    /// Documented provider limit
    #[serde(default = "default_metadata_rps")]
    pub metadata_requests_per_second: u32,
    #[serde(default = "default_metadata_image_base_url")]
    pub metadata_image_base_url: String,
    #[serde(default = "default_stock_base_url")]
    pub stock_base_url: String,
    #[serde(default)]
    pub stock_api_key: Option<String>,
    #[serde(default = "default_stock_rps")]
    pub stock_requests_per_second: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            metadata_base_url: default_metadata_base_url(),
            metadata_api_key: None,
            metadata_requests_per_second: default_metadata_rps(),
            metadata_image_base_url: default_metadata_image_base_url(),
            stock_base_url: default_stock_base_url(),
            stock_api_key: None,
            stock_requests_per_second: default_stock_rps(),
        }
    }
}

impl ProviderConfig {
    /// Metadata provider key (ENV → TOML)
    pub fn resolve_metadata_key(&self) -> Option<String> {
        resolve_api_key("metadata", METADATA_KEY_ENV_VAR, self.metadata_api_key.as_deref())
    }

    /// Stock image provider key (ENV → TOML)
    pub fn resolve_stock_key(&self) -> Option<String> {
        resolve_api_key("stock", STOCK_KEY_ENV_VAR, self.stock_api_key.as_deref())
    }
}

fn resolve_api_key(provider: &str, env_var: &str, toml_key: Option<&str>) -> Option<String> {
    let env_key = std::env::var(env_var).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_key.filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            provider,
            "API key found in both environment and TOML. Using environment (highest priority)."
        );
    }

    if let Some(key) = env_key {
        info!(provider, "API key loaded from environment variable");
        return Some(key);
    }
    if let Some(key) = toml_key {
        info!(provider, "API key loaded from TOML config");
        return Some(key.to_string());
    }

    warn!(provider, "No API key configured; provider disabled");
    None
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

fn default_metadata_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_metadata_image_base_url() -> String {
    "https://image.tmdb.org/t/p/w780".to_string()
}

fn default_metadata_rps() -> u32 {
    4
}

fn default_stock_base_url() -> String {
    "https://api.pexels.com/v1".to_string()
}

fn default_stock_rps() -> u32 {
    2
}

/// Pipeline-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Bulk worker pool size
    #[serde(default = "default_worker_limit")]
    pub worker_limit: usize,
    /// Image candidate list cap
    #[serde(default = "default_max_image_candidates")]
    pub max_image_candidates: usize,
    /// Variants generated per rerun/regenerate
    #[serde(default = "default_variant_count")]
    pub variant_count: usize,
    /// Base URL for deterministic placeholder and pattern images
    #[serde(default = "default_placeholder_base_url")]
    pub placeholder_base_url: String,
    /// Minimum vote count for a provider rating to count as trusted
    #[serde(default = "default_min_trusted_votes")]
    pub min_trusted_votes: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            worker_limit: default_worker_limit(),
            max_image_candidates: default_max_image_candidates(),
            variant_count: default_variant_count(),
            placeholder_base_url: default_placeholder_base_url(),
            min_trusted_votes: default_min_trusted_votes(),
        }
    }
}

fn default_worker_limit() -> usize {
    4
}

fn default_max_image_candidates() -> usize {
    5
}

fn default_variant_count() -> usize {
    3
}

fn default_placeholder_base_url() -> String {
    "https://static.mediq.local/img".to_string()
}

fn default_min_trusted_votes() -> f64 {
    50.0
}

/// Timeout + bounded retry for provider calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            timeout_ms: default_timeout_ms(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Exponential backoff before attempt `attempt + 1` (1-based `attempt`)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2000
}

/// Validator bounds and severity overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_title_min_chars")]
    pub title_min_chars: usize,
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
    #[serde(default = "default_excerpt_max_chars")]
    pub excerpt_max_chars: usize,
    #[serde(default = "default_body_min_chars")]
    pub body_min_chars: usize,
    /// Issue code → "warning" | "blocking" | "unrecoverable"
    #[serde(default)]
    pub severity: BTreeMap<String, String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            title_min_chars: default_title_min_chars(),
            title_max_chars: default_title_max_chars(),
            excerpt_max_chars: default_excerpt_max_chars(),
            body_min_chars: default_body_min_chars(),
            severity: BTreeMap::new(),
        }
    }
}

fn default_title_min_chars() -> usize {
    3
}

fn default_title_max_chars() -> usize {
    200
}

fn default_excerpt_max_chars() -> usize {
    400
}

fn default_body_min_chars() -> usize {
    40
}

/// Editorial Score Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// `needs_review` when confidence falls below this
    #[serde(default = "default_needs_review_threshold")]
    pub needs_review_threshold: f64,
    /// Trailing window for comparable entities, in years before the subject
    #[serde(default = "default_comparable_window_years")]
    pub comparable_window_years: i32,
    /// Upper bound on comparables fetched from the store
    #[serde(default = "default_comparable_limit")]
    pub comparable_limit: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            needs_review_threshold: default_needs_review_threshold(),
            comparable_window_years: default_comparable_window_years(),
            comparable_limit: default_comparable_limit(),
        }
    }
}

fn default_needs_review_threshold() -> f64 {
    0.5
}

fn default_comparable_window_years() -> i32 {
    15
}

fn default_comparable_limit() -> u32 {
    50
}

/// Additions to the built-in lookup tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableOverrides {
    /// Topic term → stock search keyword
    #[serde(default)]
    pub topic_keywords: BTreeMap<String, String>,
    /// Person/topic name → stock search keyword, checked before topics
    #[serde(default)]
    pub celebrity_overrides: BTreeMap<String, String>,
    /// Extra English sensitive terms
    #[serde(default)]
    pub sensitive_terms: Vec<String>,
    /// Extra localized sensitive terms
    #[serde(default)]
    pub sensitive_terms_localized: Vec<String>,
    /// Slug or lowercase title → curated image URL
    #[serde(default)]
    pub curated_images: BTreeMap<String, String>,
    /// Extra (genre, decade) priors
    #[serde(default)]
    pub genre_era: Vec<GenreEraPrior>,
}

/// One genre+era prior entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenreEraPrior {
    pub genre: String,
    /// Decade start year, e.g. 1990
    pub decade: i32,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EiConfig::default();
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.pipeline.max_image_candidates, 5);
        assert_eq!(config.scoring.needs_review_threshold, 0.5);
        assert_eq!(config.bootstrap.port, 5731);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(10), Duration::from_millis(2000));
    }

    #[test]
    fn test_parse_full_toml() {
        let config: EiConfig = toml::from_str(
            r#"
            port = 7000

            [logging]
            level = "debug"

            [providers]
            metadata_requests_per_second = 2

            [retry]
            attempts = 2

            [validation.severity]
            missing_category = "warning"

            [scoring]
            comparable_window_years = 10

            [[tables.genre_era]]
            genre = "western"
            decade = 1960
            score = 7.4
            "#,
        )
        .unwrap();

        assert_eq!(config.bootstrap.port, 7000);
        assert_eq!(config.bootstrap.logging.level, "debug");
        assert_eq!(config.providers.metadata_requests_per_second, 2);
        assert_eq!(config.retry.attempts, 2);
        assert_eq!(config.retry.timeout_ms, 5000);
        assert_eq!(
            config.validation.severity.get("missing_category").map(String::as_str),
            Some("warning")
        );
        assert_eq!(config.scoring.comparable_window_years, 10);
        assert_eq!(config.tables.genre_era.len(), 1);
    }
}
