//! Lookup tables shared by the pipeline components
//!
//! Keyword maps, sensitive-term patterns, curated images and genre/era priors.
//! Built once per process from the built-in tables plus [`TableOverrides`],
//! then passed explicitly (as `Arc<KnowledgeTables>`) into every component.
//! Nothing here is mutated after construction.

use crate::config::TableOverrides;
use crate::error::{PipelineError, PipelineResult};
use crate::types::NormalizedEntity;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Fallback prior when neither (genre, decade) nor genre is known
const DEFAULT_PRIOR: f64 = 6.0;

/// (term, stock search keyword), checked in order
const TOPIC_KEYWORDS: &[(&str, &str)] = &[
    ("oscar", "award ceremony"),
    ("award", "award ceremony"),
    ("festival", "film festival"),
    ("box office", "cinema audience"),
    ("premiere", "red carpet"),
    ("trailer", "movie projector"),
    ("anime", "animation art"),
    ("horror", "dark forest"),
    ("superhero", "city skyline night"),
    ("space", "outer space"),
    ("music", "concert stage"),
    ("concert", "concert stage"),
    ("football", "football stadium"),
    ("travel", "travel landscape"),
    ("food", "food table"),
    ("technology", "technology"),
    ("fashion", "fashion runway"),
    ("interview", "microphone studio"),
];

/// (person or franchise, keyword), checked before topics
const CELEBRITY_OVERRIDES: &[(&str, &str)] = &[
    ("christopher nolan", "film camera"),
    ("studio ghibli", "watercolor landscape"),
    ("taylor swift", "concert stage lights"),
    ("marvel", "city skyline night"),
];

const CATEGORY_KEYWORDS: &[(&str, &str)] = &[
    ("movie-news", "cinema"),
    ("review", "cinema seats"),
    ("celebrity", "red carpet"),
    ("tv", "television"),
    ("music", "concert"),
];

const SENSITIVE_TERMS: &[&str] = &[
    "accident", "crash", "death", "dead", "died", "dies", "killed", "killing", "murder",
    "suicide", "violence", "violent", "assault", "abuse", "abused", "shooting", "stabbing",
    "massacre", "terror", "terrorist", "rape", "kidnap", "funeral", "tragedy", "disaster",
    "explosion", "overdose",
];

const SENSITIVE_TERMS_LOCALIZED: &[&str] = &[
    "tai nạn", "tử vong", "qua đời", "thiệt mạng", "giết", "án mạng", "bạo lực", "bạo hành",
    "lạm dụng", "tự tử", "xâm hại", "thảm kịch", "hành hung",
];

const ABSTRACT_CATEGORIES: &[&str] = &[
    "abstract pattern",
    "geometric texture",
    "soft gradient",
    "minimal shapes",
    "ink texture",
];

const PLACEHOLDER_TITLES: &[&str] = &[
    "untitled", "no title", "tbd", "tba", "n/a", "test", "draft", "lorem ipsum", "new post",
    "chưa có tiêu đề",
];

/// (genre, decade, prior) on the 0-10 scale
const GENRE_ERA_PRIORS: &[(&str, i32, f64)] = &[
    ("drama", 1970, 7.3),
    ("drama", 1980, 7.0),
    ("drama", 1990, 7.1),
    ("drama", 2000, 6.9),
    ("drama", 2010, 6.8),
    ("drama", 2020, 6.7),
    ("comedy", 1980, 6.5),
    ("comedy", 1990, 6.4),
    ("comedy", 2000, 6.1),
    ("comedy", 2010, 6.0),
    ("comedy", 2020, 6.0),
    ("action", 1980, 6.4),
    ("action", 1990, 6.5),
    ("action", 2000, 6.3),
    ("action", 2010, 6.3),
    ("action", 2020, 6.2),
    ("horror", 1970, 6.6),
    ("horror", 1980, 6.2),
    ("horror", 1990, 5.9),
    ("horror", 2000, 5.6),
    ("horror", 2010, 5.7),
    ("thriller", 1990, 6.6),
    ("thriller", 2000, 6.4),
    ("thriller", 2010, 6.3),
    ("animation", 1990, 7.0),
    ("animation", 2000, 6.9),
    ("animation", 2010, 6.9),
    ("science fiction", 1980, 6.8),
    ("science fiction", 1990, 6.5),
    ("science fiction", 2000, 6.4),
    ("science fiction", 2010, 6.5),
    ("crime", 1970, 7.2),
    ("crime", 1990, 7.0),
    ("crime", 2000, 6.7),
    ("documentary", 2000, 7.1),
    ("documentary", 2010, 7.1),
    ("romance", 1990, 6.5),
    ("romance", 2000, 6.3),
    ("romance", 2010, 6.2),
];

/// Genre-only fallback priors
const GENRE_DEFAULTS: &[(&str, f64)] = &[
    ("drama", 6.9),
    ("comedy", 6.2),
    ("action", 6.3),
    ("horror", 5.8),
    ("thriller", 6.4),
    ("animation", 6.9),
    ("science fiction", 6.5),
    ("crime", 6.8),
    ("documentary", 7.1),
    ("romance", 6.3),
    ("fantasy", 6.3),
    ("adventure", 6.4),
];

/// Result of a genre/era prior lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorLookup {
    pub score: f64,
    /// True only for an exact (genre, decade) hit
    pub exact: bool,
}

/// Immutable lookup tables
#[derive(Debug, Clone)]
pub struct KnowledgeTables {
    topic_keywords: Vec<(String, String)>,
    celebrity_overrides: Vec<(String, String)>,
    category_keywords: HashMap<String, String>,
    sensitive_pattern: Regex,
    abstract_categories: Vec<String>,
    curated_images: BTreeMap<String, String>,
    genre_era: HashMap<(String, i32), f64>,
    genre_defaults: HashMap<String, f64>,
    placeholder_titles: Vec<String>,
}

impl KnowledgeTables {
    /// Built-in tables only
    pub fn builtin() -> PipelineResult<Self> {
        Self::with_overrides(&TableOverrides::default())
    }

    /// Built-in tables extended by configuration
    ///
    /// Override entries are checked before built-in ones.
    pub fn with_overrides(overrides: &TableOverrides) -> PipelineResult<Self> {
        let mut celebrity_overrides: Vec<(String, String)> = overrides
            .celebrity_overrides
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.clone()))
            .collect();
        celebrity_overrides.extend(
            CELEBRITY_OVERRIDES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );

        let mut topic_keywords: Vec<(String, String)> = overrides
            .topic_keywords
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.clone()))
            .collect();
        topic_keywords.extend(
            TOPIC_KEYWORDS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );

        let mut terms: Vec<String> = SENSITIVE_TERMS.iter().map(|t| t.to_string()).collect();
        terms.extend(SENSITIVE_TERMS_LOCALIZED.iter().map(|t| t.to_string()));
        terms.extend(overrides.sensitive_terms.iter().cloned());
        terms.extend(overrides.sensitive_terms_localized.iter().cloned());
        let sensitive_pattern = build_term_pattern(&terms)?;

        let mut genre_era: HashMap<(String, i32), f64> = GENRE_ERA_PRIORS
            .iter()
            .map(|(g, d, s)| ((g.to_string(), *d), *s))
            .collect();
        for prior in &overrides.genre_era {
            genre_era.insert((prior.genre.to_lowercase(), decade_of(prior.decade)), prior.score);
        }

        let curated_images = overrides
            .curated_images
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.clone()))
            .collect();

        debug!(
            sensitive_terms = terms.len(),
            genre_era_entries = genre_era.len(),
            "Knowledge tables loaded"
        );

        Ok(Self {
            topic_keywords,
            celebrity_overrides,
            category_keywords: CATEGORY_KEYWORDS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            sensitive_pattern,
            abstract_categories: ABSTRACT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
            curated_images,
            genre_era,
            genre_defaults: GENRE_DEFAULTS
                .iter()
                .map(|(g, s)| (g.to_string(), *s))
                .collect(),
            placeholder_titles: PLACEHOLDER_TITLES.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// First sensitive term found in `text`, lowercased
    pub fn sensitive_match(&self, text: &str) -> Option<String> {
        self.sensitive_pattern
            .find(text)
            .map(|m| m.as_str().to_lowercase())
    }

    /// First sensitive term in the entity's titles, body or excerpt, with
    /// the field it was found in
    pub fn entity_sensitive_match(&self, entity: &NormalizedEntity) -> Option<(&'static str, String)> {
        [
            ("title_primary", entity.title_primary.as_deref()),
            ("title_localized", entity.title_localized.as_deref()),
            ("body_localized", entity.body_localized.as_deref()),
            ("excerpt", entity.excerpt.as_deref()),
        ]
        .into_iter()
        .find_map(|(field, text)| text.and_then(|t| self.sensitive_match(t)).map(|term| (field, term)))
    }

    /// Override keyword for a known person/topic mentioned in `text`
    pub fn celebrity_keyword(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.celebrity_overrides
            .iter()
            .find(|(name, _)| contains_term(&lower, name))
            .map(|(_, keyword)| keyword.as_str())
    }

    /// Keyword for the first topic term found in `text`
    pub fn topic_keyword(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.topic_keywords
            .iter()
            .find(|(term, _)| contains_term(&lower, term))
            .map(|(_, keyword)| keyword.as_str())
    }

    pub fn category_keyword(&self, category: &str) -> Option<&str> {
        self.category_keywords
            .get(&category.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Abstract/pattern category picked deterministically from `seed`
    pub fn abstract_category(&self, seed: u64) -> &str {
        let idx = (seed % self.abstract_categories.len() as u64) as usize;
        &self.abstract_categories[idx]
    }

    /// Curated image by slug, then by lowercase title
    pub fn curated_image(&self, slug: &str, title: Option<&str>) -> Option<&str> {
        self.curated_images
            .get(&slug.to_lowercase())
            .or_else(|| title.and_then(|t| self.curated_images.get(&t.trim().to_lowercase())))
            .map(String::as_str)
    }

    /// Prior for (genre, decade of `year`)
    ///
    /// Falls back to the genre default, then the global default; only an
    /// exact (genre, decade) hit counts as real data.
    pub fn genre_era_prior(&self, genre: Option<&str>, year: Option<i32>) -> PriorLookup {
        let genre = genre.map(|g| g.trim().to_lowercase());

        if let (Some(g), Some(y)) = (genre.as_ref(), year) {
            if let Some(score) = self.genre_era.get(&(g.clone(), decade_of(y))) {
                return PriorLookup {
                    score: *score,
                    exact: true,
                };
            }
        }

        let score = genre
            .as_ref()
            .and_then(|g| self.genre_defaults.get(g))
            .copied()
            .unwrap_or(DEFAULT_PRIOR);
        PriorLookup {
            score,
            exact: false,
        }
    }

    /// Boilerplate title such as "Untitled" or "TBD"
    pub fn is_placeholder_title(&self, title: &str) -> bool {
        let lower = title.trim().to_lowercase();
        self.placeholder_titles.iter().any(|p| *p == lower)
    }
}

/// Decade bucket start year (1994 → 1990)
pub fn decade_of(year: i32) -> i32 {
    year.div_euclid(10) * 10
}

fn build_term_pattern(terms: &[String]) -> PipelineResult<Regex> {
    let alternation = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation))
        .map_err(|e| PipelineError::InvalidInput(format!("sensitive term pattern: {}", e)))
}

/// Whole-word containment on already-lowercased text
fn contains_term(haystack: &str, term: &str) -> bool {
    haystack.match_indices(term).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
