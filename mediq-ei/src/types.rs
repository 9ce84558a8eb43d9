//! Core Types for mediq-ei
//!
//! Data contracts between the pipeline stages:
//! - **Source adapters** produce [`SourceFragment`]s (one per provider, never merged)
//! - **Normalizer** merges fragments into a [`NormalizedEntity`] with per-field provenance
//! - **Validator** attaches a [`ValidationResult`] and derives [`EntityStatus`]
//! - **Image Intelligence** fills `image_*` fields and ranked [`ImageCandidate`]s
//! - **Synthesis Engine** proposes [`Variant`]s
//! - **Editorial Score Engine** produces [`EditorialScoreResult`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identity
// ============================================================================

/// Stable entity identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Entity discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[default]
    Post,
    Movie,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Movie => "movie",
        }
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "post" | "article" => Ok(Self::Post),
            "movie" | "film" => Ok(Self::Movie),
            other => Err(format!("unknown entity type: {}", other)),
        }
    }
}

// ============================================================================
// Status
// ============================================================================

/// Publish-readiness status
///
/// `Draft` is the pre-validation default. Every other value is derived by the
/// Validator from current field state and never stored independently of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    #[default]
    Draft,
    Ready,
    NeedsReview,
    Rejected,
}

impl EntityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Ready => "READY",
            Self::NeedsReview => "NEEDS_REVIEW",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(Self::Draft),
            "READY" => Ok(Self::Ready),
            "NEEDS_REVIEW" => Ok(Self::NeedsReview),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Blocking,
    Warning,
}

/// Stable code for every issue a validation rule can raise
///
/// Codes are the keys of the severity policy, so configuration can move an
/// issue between warning, recoverable blocking and unrecoverable blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    MissingContent,
    MissingTitle,
    MissingCategory,
    EmptyLocalizedTitle,
    TitleTooShort,
    TitleTooLong,
    ExcerptTooLong,
    BodyTooShort,
    InvalidSlug,
    InvalidImageUrl,
    PlaceholderTitle,
    DuplicateContent,
    SensitiveContent,
}

impl IssueCode {
    pub const ALL: [IssueCode; 13] = [
        Self::MissingContent,
        Self::MissingTitle,
        Self::MissingCategory,
        Self::EmptyLocalizedTitle,
        Self::TitleTooShort,
        Self::TitleTooLong,
        Self::ExcerptTooLong,
        Self::BodyTooShort,
        Self::InvalidSlug,
        Self::InvalidImageUrl,
        Self::PlaceholderTitle,
        Self::DuplicateContent,
        Self::SensitiveContent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingContent => "missing_content",
            Self::MissingTitle => "missing_title",
            Self::MissingCategory => "missing_category",
            Self::EmptyLocalizedTitle => "empty_localized_title",
            Self::TitleTooShort => "title_too_short",
            Self::TitleTooLong => "title_too_long",
            Self::ExcerptTooLong => "excerpt_too_long",
            Self::BodyTooShort => "body_too_short",
            Self::InvalidSlug => "invalid_slug",
            Self::InvalidImageUrl => "invalid_image_url",
            Self::PlaceholderTitle => "placeholder_title",
            Self::DuplicateContent => "duplicate_content",
            Self::SensitiveContent => "sensitive_content",
        }
    }
}

impl FromStr for IssueCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == s.trim())
            .ok_or_else(|| format!("unknown issue code: {}", s))
    }
}

/// One itemized validation finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    /// Rule that raised the issue
    pub rule: String,
    /// True when the issue cannot be fixed by synthesis or image steps
    #[serde(default)]
    pub unrecoverable: bool,
}

/// Validator output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: EntityStatus,
    pub issues: Vec<ValidationIssue>,
    /// Mean of rule-level confidences (0.0-1.0)
    pub confidence: f64,
}

impl ValidationResult {
    pub fn blocking_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Blocking)
    }

    pub fn has_blocking(&self) -> bool {
        self.blocking_issues().next().is_some()
    }
}

// ============================================================================
// Provenance
// ============================================================================

/// Provider class, in merge priority order (first wins ties)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Our own stored record
    Internal,
    /// Primary structured metadata provider
    PrimaryMetadata,
    /// Any other provider
    Secondary,
}

impl ProviderKind {
    /// Tie-break rank, lower wins
    pub fn priority(self) -> u8 {
        match self {
            Self::Internal => 0,
            Self::PrimaryMetadata => 1,
            Self::Secondary => 2,
        }
    }

    /// Default confidence for fragments from this kind of provider
    pub fn default_confidence(self) -> f64 {
        match self {
            Self::Internal => 0.95,
            Self::PrimaryMetadata => 0.85,
            Self::Secondary => 0.6,
        }
    }
}

/// Contributor role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributorRole {
    Director,
    Lead,
    Writer,
    Author,
    Other,
}

/// Person credited on an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub role: ContributorRole,
}

impl Contributor {
    pub fn new(name: impl Into<String>, role: ContributorRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }
}

/// Boolean editorial signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EditorialFlags {
    #[serde(default)]
    pub classic: bool,
    #[serde(default)]
    pub blockbuster: bool,
    #[serde(default)]
    pub underrated: bool,
}

impl EditorialFlags {
    pub fn any(&self) -> bool {
        self.classic || self.blockbuster || self.underrated
    }
}

/// Field values one provider reported for an entity
///
/// Every field is optional; adapters fill only what they know.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FragmentFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_primary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_localized: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_localized: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributors: Vec<Contributor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<EditorialFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_source: Option<ImageSource>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_ids: BTreeMap<String, String>,
}

/// Provider-tagged fragment; also the provenance entry kept in `sources`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFragment {
    /// Provider name (e.g. "internal", "tmdb")
    pub source: String,
    pub kind: ProviderKind,
    /// Identifier of the record at the provider
    pub source_id: String,
    /// Fragment confidence (0.0-1.0)
    pub confidence: f64,
    pub fetched_at: DateTime<Utc>,
    /// Everything the provider reported, kept verbatim for audit
    pub fields: FragmentFields,
}

impl SourceFragment {
    /// Create fragment with clamped confidence
    pub fn new(
        source: impl Into<String>,
        kind: ProviderKind,
        source_id: impl Into<String>,
        confidence: f64,
        fields: FragmentFields,
    ) -> Self {
        Self {
            source: source.into(),
            kind,
            source_id: source_id.into(),
            confidence: confidence.clamp(0.0, 1.0),
            fetched_at: Utc::now(),
            fields,
        }
    }
}

/// Which fragment supplied a merged field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldProvenance {
    pub source: String,
    pub confidence: f64,
}

// ============================================================================
// Images
// ============================================================================

/// Where an image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// Curated known-entity mapping
    Curated,
    /// Literal keyword search on a stock provider
    Stock,
    /// Abstract/pattern imagery forced by the sensitivity check
    Abstract,
    /// Deterministic slug-keyed placeholder
    Placeholder,
    /// Image reported by a metadata provider (e.g. poster)
    Provider,
    /// Chosen by an operator outside the candidate set
    Manual,
}

/// Ranked image alternative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub url: String,
    pub source: ImageSource,
    /// Provider or tier that produced it
    pub provider: String,
    /// tier weight × provider relevance
    pub score: f64,
}

// ============================================================================
// Variants
// ============================================================================

/// Alternative content bundle proposed for review
///
/// `None` fields leave the current value untouched when applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: Uuid,
    /// Template that produced this variant
    pub template_id: String,
    /// Inputs substituted into the template
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub title_primary: Option<String>,
    #[serde(default)]
    pub title_localized: Option<String>,
    #[serde(default)]
    pub body_localized: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
}

impl Variant {
    /// Write this variant's content fields onto `entity`
    ///
    /// Fields whose value changes are attributed to `variant:<template_id>`.
    pub fn apply_to(&self, entity: &mut NormalizedEntity) {
        let source = format!("variant:{}", self.template_id);
        let fields = [
            ("title_primary", &self.title_primary, &mut entity.title_primary),
            ("title_localized", &self.title_localized, &mut entity.title_localized),
            ("body_localized", &self.body_localized, &mut entity.body_localized),
            ("excerpt", &self.excerpt, &mut entity.excerpt),
        ];

        for (field, proposed, current) in fields {
            let Some(value) = proposed else { continue };
            if current.as_ref() == Some(value) {
                continue;
            }
            *current = Some(value.clone());
            entity.provenance.insert(
                field.to_string(),
                FieldProvenance {
                    source: source.clone(),
                    confidence: 1.0,
                },
            );
        }
    }
}

// ============================================================================
// Canonical entity
// ============================================================================

/// Canonical unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEntity {
    pub id: EntityId,
    pub slug: String,
    pub entity_type: EntityType,
    pub title_primary: Option<String>,
    pub title_localized: Option<String>,
    pub body_localized: Option<String>,
    pub excerpt: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
    #[serde(default)]
    pub contributors: Vec<Contributor>,
    #[serde(default)]
    pub external_rating: Option<f64>,
    #[serde(default)]
    pub flags: EditorialFlags,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
    pub image_url: Option<String>,
    pub image_source: Option<ImageSource>,
    /// Working state, not persisted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_candidates: Vec<ImageCandidate>,
    pub sources: Vec<SourceFragment>,
    /// Field name → fragment that won the merge
    #[serde(default)]
    pub provenance: BTreeMap<String, FieldProvenance>,
    pub status: EntityStatus,
    pub validation: Option<ValidationResult>,
    /// Working state, present only when status != Ready
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<Variant>,
}

impl NormalizedEntity {
    /// Empty draft entity with the given identity
    pub fn new(id: EntityId, entity_type: EntityType, slug: impl Into<String>) -> Self {
        Self {
            id,
            slug: slug.into(),
            entity_type,
            title_primary: None,
            title_localized: None,
            body_localized: None,
            excerpt: None,
            category: None,
            genres: Vec::new(),
            release_year: None,
            contributors: Vec::new(),
            external_rating: None,
            flags: EditorialFlags::default(),
            popularity: None,
            external_ids: BTreeMap::new(),
            image_url: None,
            image_source: None,
            image_candidates: Vec::new(),
            sources: Vec::new(),
            provenance: BTreeMap::new(),
            status: EntityStatus::Draft,
            validation: None,
            variants: Vec::new(),
        }
    }

    /// Best available display title (primary, then localized)
    pub fn display_title(&self) -> Option<&str> {
        non_empty(self.title_primary.as_deref()).or_else(|| non_empty(self.title_localized.as_deref()))
    }

    /// Primary genre (first listed)
    pub fn primary_genre(&self) -> Option<&str> {
        self.genres.first().map(String::as_str)
    }

    /// Director, then lead, then author
    pub fn primary_contributor(&self) -> Option<&Contributor> {
        [ContributorRole::Director, ContributorRole::Lead, ContributorRole::Author]
            .iter()
            .find_map(|role| self.contributors.iter().find(|c| c.role == *role))
    }

    /// Which fragment supplied `field`
    pub fn provenance(&self, field: &str) -> Option<&FieldProvenance> {
        self.provenance.get(field)
    }

    /// Drop working state (variants and image candidates)
    pub fn clear_working_state(&mut self) {
        self.variants.clear();
        self.image_candidates.clear();
    }
}

/// `Some` only for strings with visible content
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// URL-safe slug: lowercase ASCII alphanumerics joined by single dashes
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

// ============================================================================
// Editorial score
// ============================================================================

/// Unweighted sub-scores (each 0-10)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub genre_era: f64,
    pub comparable: f64,
    pub metadata: f64,
}

/// Editorial Score Engine output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorialScoreResult {
    /// Weighted score (0-10)
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    /// Fraction of sub-scores backed by real data (0.0-1.0)
    pub confidence: f64,
    pub needs_review: bool,
    pub reasoning: Vec<String>,
}
