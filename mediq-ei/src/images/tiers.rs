//! Image tiers, in chain order

use super::keywords::derive_keyword;
use super::{ImageHit, ImageProvider, ImageQuery, ImageTier};
use crate::config::RetryPolicy;
use crate::knowledge::KnowledgeTables;
use crate::types::{slugify, ImageCandidate, ImageSource};
use crate::utils::{degrade, with_retry};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

pub const CURATED_WEIGHT: f64 = 1.0;
pub const ABSTRACT_WEIGHT: f64 = 0.8;
pub const KEYWORD_WEIGHT: f64 = 0.7;
pub const PLACEHOLDER_WEIGHT: f64 = 0.1;

/// Relevance of the generated pattern image in the abstract tier
const PATTERN_RELEVANCE: f64 = 0.5;

/// Hex chars of the slug digest used in generated URLs
const DIGEST_CHARS: usize = 16;

fn slug_digest(slug: &str) -> [u8; 32] {
    Sha256::digest(slug.as_bytes()).into()
}

fn digest_hex(digest: &[u8; 32]) -> String {
    digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
        .chars()
        .take(DIGEST_CHARS)
        .collect()
}

fn digest_seed(digest: &[u8; 32]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Try each provider in order; first non-empty result wins
async fn search_providers(
    providers: &[Arc<dyn ImageProvider>],
    retry: &RetryPolicy,
    keyword: &str,
    limit: usize,
) -> Option<Vec<ImageHit>> {
    for provider in providers {
        let result = with_retry(provider.name(), retry, || provider.search(keyword, limit)).await;
        match degrade(provider.name(), result) {
            Some(hits) if !hits.is_empty() => return Some(hits),
            _ => debug!(provider = provider.name(), keyword, "No images from provider"),
        }
    }
    None
}

// ============================================================================
// Tier 1: curated identity lookup
// ============================================================================

pub struct CuratedTier {
    tables: Arc<KnowledgeTables>,
}

impl CuratedTier {
    pub fn new(tables: Arc<KnowledgeTables>) -> Self {
        Self { tables }
    }
}

#[async_trait]
impl ImageTier for CuratedTier {
    fn name(&self) -> &'static str {
        "curated"
    }

    fn source(&self) -> ImageSource {
        ImageSource::Curated
    }

    fn weight(&self) -> f64 {
        CURATED_WEIGHT
    }

    async fn attempt(&self, query: &ImageQuery) -> Option<Vec<ImageHit>> {
        // A known-entity photo is still a literal photo
        if query.is_sensitive() {
            return None;
        }
        let url = self
            .tables
            .curated_image(&query.slug, query.title.as_deref())?;
        Some(vec![ImageHit {
            url: url.to_string(),
            relevance: 1.0,
            provider: "curated".to_string(),
        }])
    }
}

// ============================================================================
// Tier 2: sensitive-content check → abstract/pattern imagery
// ============================================================================

pub struct AbstractPatternTier {
    tables: Arc<KnowledgeTables>,
    providers: Vec<Arc<dyn ImageProvider>>,
    retry: RetryPolicy,
    base_url: String,
    limit: usize,
}

impl AbstractPatternTier {
    pub fn new(
        tables: Arc<KnowledgeTables>,
        providers: Vec<Arc<dyn ImageProvider>>,
        retry: RetryPolicy,
        base_url: &str,
        limit: usize,
    ) -> Self {
        Self {
            tables,
            providers,
            retry,
            base_url: base_url.trim_end_matches('/').to_string(),
            limit,
        }
    }
}

#[async_trait]
impl ImageTier for AbstractPatternTier {
    fn name(&self) -> &'static str {
        "abstract"
    }

    fn source(&self) -> ImageSource {
        ImageSource::Abstract
    }

    fn weight(&self) -> f64 {
        ABSTRACT_WEIGHT
    }

    async fn attempt(&self, query: &ImageQuery) -> Option<Vec<ImageHit>> {
        let term = query.sensitive_term.as_deref()?;

        let digest = slug_digest(&query.slug);
        let category = self.tables.abstract_category(digest_seed(&digest));
        info!(
            slug = %query.slug,
            term,
            category,
            "Sensitive content, forcing abstract imagery"
        );

        // Only the abstract category is ever sent to providers
        let mut hits = search_providers(&self.providers, &self.retry, category, self.limit)
            .await
            .unwrap_or_default();
        hits.push(ImageHit {
            url: format!(
                "{}/pattern/{}/{}.svg",
                self.base_url,
                slugify(category),
                digest_hex(&digest)
            ),
            relevance: PATTERN_RELEVANCE,
            provider: "pattern".to_string(),
        });
        Some(hits)
    }
}

// ============================================================================
// Tier 3: keyword-driven stock search
// ============================================================================

pub struct KeywordSearchTier {
    tables: Arc<KnowledgeTables>,
    providers: Vec<Arc<dyn ImageProvider>>,
    retry: RetryPolicy,
    limit: usize,
}

impl KeywordSearchTier {
    pub fn new(
        tables: Arc<KnowledgeTables>,
        providers: Vec<Arc<dyn ImageProvider>>,
        retry: RetryPolicy,
        limit: usize,
    ) -> Self {
        Self {
            tables,
            providers,
            retry,
            limit,
        }
    }
}

#[async_trait]
impl ImageTier for KeywordSearchTier {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn source(&self) -> ImageSource {
        ImageSource::Stock
    }

    fn weight(&self) -> f64 {
        KEYWORD_WEIGHT
    }

    async fn attempt(&self, query: &ImageQuery) -> Option<Vec<ImageHit>> {
        if query.is_sensitive() {
            return None;
        }
        let keyword = derive_keyword(query, &self.tables)?;
        debug!(slug = %query.slug, keyword = %keyword, "Keyword image search");
        search_providers(&self.providers, &self.retry, &keyword, self.limit).await
    }
}

// ============================================================================
// Tier 4: deterministic placeholder
// ============================================================================

pub struct PlaceholderTier {
    base_url: String,
}

impl PlaceholderTier {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Same slug, same URL
    pub fn url_for(&self, slug: &str) -> String {
        format!(
            "{}/placeholder/{}.svg",
            self.base_url,
            digest_hex(&slug_digest(slug))
        )
    }

    pub fn hit_for(&self, slug: &str) -> ImageHit {
        ImageHit {
            url: self.url_for(slug),
            relevance: 1.0,
            provider: "placeholder".to_string(),
        }
    }

    pub fn candidate_for(&self, slug: &str) -> ImageCandidate {
        ImageCandidate {
            url: self.url_for(slug),
            source: ImageSource::Placeholder,
            provider: "placeholder".to_string(),
            score: PLACEHOLDER_WEIGHT,
        }
    }
}

#[async_trait]
impl ImageTier for PlaceholderTier {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn source(&self) -> ImageSource {
        ImageSource::Placeholder
    }

    fn weight(&self) -> f64 {
        PLACEHOLDER_WEIGHT
    }

    async fn attempt(&self, query: &ImageQuery) -> Option<Vec<ImageHit>> {
        Some(vec![self.hit_for(&query.slug)])
    }
}
