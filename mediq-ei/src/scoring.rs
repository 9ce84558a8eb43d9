//! Editorial Score Engine
//!
//! Quality score for entities with no trusted external rating.
//!
//! # Scoring Algorithm
//! Three independently computed sub-scores (0-10), combined by fixed weights:
//! - **genre_era** (30%): prior for (primary genre, decade)
//! - **comparable** (40%): mean score of other entities sharing the primary
//!   contributor within the trailing window; falls back to the genre_era prior
//! - **metadata** (30%): genre_era prior adjusted by flag and popularity terms
//!
//! `confidence` is the fraction of sub-scores backed by real data rather than
//! a fallback. Pure: identical input gives identical output.

use crate::config::ScoringConfig;
use crate::knowledge::KnowledgeTables;
use crate::types::{EditorialScoreResult, EntityId, NormalizedEntity, ScoreBreakdown};
use serde::{Deserialize, Serialize};

pub const GENRE_ERA_WEIGHT: f64 = 0.3;
pub const COMPARABLE_WEIGHT: f64 = 0.4;
pub const METADATA_WEIGHT: f64 = 0.3;

const CLASSIC_BONUS: f64 = 1.0;
const BLOCKBUSTER_BONUS: f64 = 0.5;
const UNDERRATED_BONUS: f64 = 0.7;

/// (minimum popularity, bonus), checked in order
const POPULARITY_TIERS: &[(f64, f64)] = &[(10_000.0, 0.5), (1_000.0, 0.2)];
const LOW_POPULARITY_THRESHOLD: f64 = 50.0;
const LOW_POPULARITY_PENALTY: f64 = -0.3;

/// Another entity used as a reference point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparableEntity {
    pub id: EntityId,
    /// Its primary contributor
    pub contributor: String,
    pub release_year: Option<i32>,
    /// Its trusted rating or last editorial score
    pub score: f64,
}

impl ComparableEntity {
    /// Reference point from a stored entity, if it has a usable score
    pub fn from_entity(entity: &NormalizedEntity, editorial: Option<&EditorialScoreResult>) -> Option<Self> {
        let contributor = entity.primary_contributor()?.name.clone();
        let score = entity.external_rating.or(editorial.map(|e| e.score))?;
        Some(Self {
            id: entity.id,
            contributor,
            release_year: entity.release_year,
            score,
        })
    }
}

/// Inclusive (first, last) release years a comparable may fall in
pub fn comparable_window(year: i32, config: &ScoringConfig) -> (i32, i32) {
    (year - config.comparable_window_years.max(0), year)
}

/// Compute the editorial score for `entity`
pub fn calculate_editorial_score(
    entity: &NormalizedEntity,
    comparables: &[ComparableEntity],
    tables: &KnowledgeTables,
    config: &ScoringConfig,
) -> EditorialScoreResult {
    let mut reasoning = Vec::new();
    let mut backed = 0u32;

    // Genre + era baseline
    let genre = entity.primary_genre();
    let prior = tables.genre_era_prior(genre, entity.release_year);
    if prior.exact {
        backed += 1;
        reasoning.push(format!(
            "Genre/era prior {:.1} for {} in the {}s",
            prior.score,
            genre.unwrap_or("unknown"),
            entity.release_year.map(crate::knowledge::decade_of).unwrap_or_default()
        ));
    } else {
        reasoning.push(format!(
            "No genre/era prior for this combination, using default {:.1}",
            prior.score
        ));
    }
    let genre_era = prior.score;

    // Comparable entities
    let relevant = relevant_comparables(entity, comparables, config);
    let comparable = if relevant.is_empty() {
        reasoning.push("No comparable entities, using genre/era baseline".to_string());
        genre_era
    } else {
        backed += 1;
        let mean = relevant.iter().map(|c| c.score).sum::<f64>() / relevant.len() as f64;
        reasoning.push(format!(
            "Average {:.2} over {} comparable entities",
            mean,
            relevant.len()
        ));
        mean
    };

    // Metadata signals
    let (adjustment, signals) = metadata_adjustment(entity);
    let metadata = (genre_era + adjustment).clamp(0.0, 10.0);
    if signals.is_empty() {
        reasoning.push("No metadata signals, using genre/era baseline".to_string());
    } else {
        backed += 1;
        reasoning.push(format!("Metadata signals {:+.1}: {}", adjustment, signals.join(", ")));
    }

    let raw = GENRE_ERA_WEIGHT * genre_era + COMPARABLE_WEIGHT * comparable + METADATA_WEIGHT * metadata;
    let score = round_to(raw.clamp(0.0, 10.0), 1);
    let confidence = round_to(f64::from(backed) / 3.0, 2);
    let needs_review = confidence < config.needs_review_threshold;
    if needs_review {
        reasoning.push(format!(
            "Confidence {:.2} below review threshold {:.2}",
            confidence, config.needs_review_threshold
        ));
    }

    EditorialScoreResult {
        score,
        breakdown: ScoreBreakdown {
            genre_era: round_to(genre_era, 2),
            comparable: round_to(comparable, 2),
            metadata: round_to(metadata, 2),
        },
        confidence,
        needs_review,
        reasoning,
    }
}

/// Comparables sharing the primary contributor inside the trailing window
///
/// The entity itself never counts. When the entity's year is known,
/// comparables without a year are excluded.
fn relevant_comparables<'a>(
    entity: &NormalizedEntity,
    comparables: &'a [ComparableEntity],
    config: &ScoringConfig,
) -> Vec<&'a ComparableEntity> {
    let Some(contributor) = entity.primary_contributor() else {
        return Vec::new();
    };
    let name = contributor.name.trim().to_lowercase();
    let window = entity.release_year.map(|y| comparable_window(y, config));

    comparables
        .iter()
        .filter(|c| c.id != entity.id)
        .filter(|c| c.contributor.trim().to_lowercase() == name)
        .filter(|c| match (window, c.release_year) {
            (None, _) => true,
            (Some((from, to)), Some(year)) => (from..=to).contains(&year),
            (Some(_), None) => false,
        })
        .filter(|c| c.score.is_finite())
        .collect()
}

fn metadata_adjustment(entity: &NormalizedEntity) -> (f64, Vec<String>) {
    let mut adjustment = 0.0;
    let mut signals = Vec::new();

    let flags = entity.flags;
    for (set, bonus, label) in [
        (flags.classic, CLASSIC_BONUS, "classic"),
        (flags.blockbuster, BLOCKBUSTER_BONUS, "blockbuster"),
        (flags.underrated, UNDERRATED_BONUS, "underrated"),
    ] {
        if set {
            adjustment += bonus;
            signals.push(format!("{} {:+.1}", label, bonus));
        }
    }

    if let Some(popularity) = entity.popularity.filter(|p| p.is_finite()) {
        let bonus = POPULARITY_TIERS
            .iter()
            .find(|(min, _)| popularity >= *min)
            .map(|(_, bonus)| *bonus)
            .unwrap_or(if popularity < LOW_POPULARITY_THRESHOLD {
                LOW_POPULARITY_PENALTY
            } else {
                0.0
            });
        adjustment += bonus;
        signals.push(format!("popularity {} {:+.1}", popularity, bonus));
    }

    (adjustment, signals)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
