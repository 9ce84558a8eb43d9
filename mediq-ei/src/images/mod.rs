//! Image Intelligence
//!
//! Resolves a best-fit image through an ordered fallback chain. Tiers share
//! one interface ([`ImageTier::attempt`]) and are tried in order until one
//! yields hits:
//!
//! 1. **curated** - known entity → known image
//! 2. **abstract** - sensitive-content check; when it triggers, the query is
//!    forced to an abstract/pattern category
//! 3. **keyword** - literal stock search on a derived keyword (never for
//!    sensitive queries)
//! 4. **placeholder** - deterministic, keyed by a slug hash
//!
//! Candidate score = tier weight × provider relevance. The placeholder is
//! always appended as a floor, so a selection always exists. Candidates are
//! deduplicated by URL, sorted by score descending and capped.

pub mod keywords;
pub mod tiers;

pub use tiers::{AbstractPatternTier, CuratedTier, KeywordSearchTier, PlaceholderTier};

use crate::config::{PipelineSettings, RetryPolicy};
use crate::error::ProviderError;
use crate::knowledge::KnowledgeTables;
use crate::types::{non_empty, ImageCandidate, ImageSource, NormalizedEntity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One image returned by a provider or tier
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHit {
    pub url: String,
    /// Provider-reported relevance (0.0-1.0)
    pub relevance: f64,
    pub provider: String,
}

/// External image/stock provider
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ranked images for a text query
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ImageHit>, ProviderError>;
}

/// What the tiers see of an entity
#[derive(Debug, Clone, PartialEq)]
pub struct ImageQuery {
    pub slug: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<String>,
    /// Sensitive term found in title/body, if any
    pub sensitive_term: Option<String>,
}

impl ImageQuery {
    /// Build the query and run the sensitivity check once
    ///
    /// The check scans the same fields the validator does.
    pub fn for_entity(entity: &NormalizedEntity, tables: &KnowledgeTables) -> Self {
        Self {
            slug: entity.slug.clone(),
            title: entity.display_title().map(str::to_string),
            body: non_empty(entity.body_localized.as_deref())
                .or_else(|| non_empty(entity.excerpt.as_deref()))
                .map(str::to_string),
            category: entity.category.clone(),
            sensitive_term: tables.entity_sensitive_match(entity).map(|(_, term)| term),
        }
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive_term.is_some()
    }

    /// Title and body joined, for keyword lookups
    pub fn text(&self) -> String {
        [self.title.as_deref(), self.body.as_deref()]
            .iter()
            .flatten()
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One strategy in the fallback chain
#[async_trait]
pub trait ImageTier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Source tag for candidates from this tier
    fn source(&self) -> ImageSource;

    /// Multiplier applied to provider relevance
    fn weight(&self) -> f64;

    /// Hits for `query`, or `None` to fall through to the next tier
    async fn attempt(&self, query: &ImageQuery) -> Option<Vec<ImageHit>>;
}

/// Selection result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSelection {
    pub selected: ImageCandidate,
    pub candidates: Vec<ImageCandidate>,
}

pub struct ImageIntelligence {
    tiers: Vec<Box<dyn ImageTier>>,
    placeholder: PlaceholderTier,
    max_candidates: usize,
}

impl ImageIntelligence {
    /// Standard chain: curated → abstract → keyword, placeholder floor
    pub fn new(
        tables: Arc<KnowledgeTables>,
        providers: Vec<Arc<dyn ImageProvider>>,
        settings: &PipelineSettings,
        retry: RetryPolicy,
    ) -> Self {
        let placeholder = PlaceholderTier::new(&settings.placeholder_base_url);
        let tiers: Vec<Box<dyn ImageTier>> = vec![
            Box::new(CuratedTier::new(Arc::clone(&tables))),
            Box::new(AbstractPatternTier::new(
                Arc::clone(&tables),
                providers.clone(),
                retry.clone(),
                &settings.placeholder_base_url,
                settings.max_image_candidates,
            )),
            Box::new(KeywordSearchTier::new(
                tables,
                providers,
                retry,
                settings.max_image_candidates,
            )),
        ];
        Self::with_tiers(tiers, placeholder, settings.max_image_candidates)
    }

    pub fn with_tiers(
        tiers: Vec<Box<dyn ImageTier>>,
        placeholder: PlaceholderTier,
        max_candidates: usize,
    ) -> Self {
        Self {
            tiers,
            placeholder,
            max_candidates: max_candidates.max(1),
        }
    }

    /// Walk the chain and rank what it produced
    pub async fn select_best_image(&self, query: &ImageQuery) -> ImageSelection {
        let mut candidates = Vec::new();

        for tier in &self.tiers {
            match tier.attempt(query).await {
                Some(hits) if !hits.is_empty() => {
                    debug!(
                        tier = tier.name(),
                        slug = %query.slug,
                        hits = hits.len(),
                        "Image tier produced candidates"
                    );
                    candidates.extend(to_candidates(tier.as_ref(), hits));
                    break;
                }
                _ => {
                    debug!(tier = tier.name(), slug = %query.slug, "Image tier yielded nothing");
                }
            }
        }

        // Floor candidate, always present
        let floor = self.placeholder.hit_for(&query.slug);
        candidates.extend(to_candidates(&self.placeholder, vec![floor]));

        let candidates = rank_candidates(candidates, self.max_candidates);
        let selected = candidates
            .first()
            .cloned()
            .unwrap_or_else(|| self.placeholder.candidate_for(&query.slug));

        ImageSelection {
            selected,
            candidates,
        }
    }
}

fn to_candidates(tier: &dyn ImageTier, hits: Vec<ImageHit>) -> Vec<ImageCandidate> {
    hits.into_iter()
        .map(|hit| ImageCandidate {
            url: hit.url,
            source: tier.source(),
            provider: hit.provider,
            score: round_score(tier.weight() * hit.relevance.clamp(0.0, 1.0)),
        })
        .collect()
}

fn round_score(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}

/// Dedupe by URL (best score wins), sort descending, cap
pub fn rank_candidates(candidates: Vec<ImageCandidate>, cap: usize) -> Vec<ImageCandidate> {
    let mut best: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<ImageCandidate> = Vec::new();

    for candidate in candidates {
        match best.get(&candidate.url) {
            Some(&idx) if unique[idx].score >= candidate.score => {}
            Some(&idx) => unique[idx] = candidate,
            None => {
                best.insert(candidate.url.clone(), unique.len());
                unique.push(candidate);
            }
        }
    }

    // Stable sort keeps chain order among equal scores
    unique.sort_by(|a, b| b.score.total_cmp(&a.score));
    unique.truncate(cap);
    unique
}
