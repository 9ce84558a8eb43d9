//! Validation rules, in evaluation order
//!
//! Each rule reports findings (field + issue code + message) and a confidence
//! equal to the fraction of its inputs that were present. Severity is not a
//! rule concern; [`super::SeverityPolicy`] maps codes to severities.

use crate::config::ValidationConfig;
use crate::knowledge::KnowledgeTables;
use crate::types::{non_empty, slugify, IssueCode, NormalizedEntity};

/// Inputs shared by every rule
pub struct RuleContext<'a> {
    pub bounds: &'a ValidationConfig,
    pub tables: &'a KnowledgeTables,
}

/// One raw finding
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub field: &'static str,
    pub code: IssueCode,
    pub message: String,
}

impl Finding {
    fn new(field: &'static str, code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            field,
            code,
            message: message.into(),
        }
    }
}

/// Rule output
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub findings: Vec<Finding>,
    /// Fraction of the rule's inputs that were present (0.0-1.0)
    pub confidence: f64,
}

pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, entity: &NormalizedEntity, ctx: &RuleContext<'_>) -> RuleOutcome;
}

/// Default ordered rule list
pub fn default_rules() -> Vec<Box<dyn ValidationRule>> {
    vec![
        Box::new(RequiredFields),
        Box::new(LocalizedConsistency),
        Box::new(LengthBounds),
        Box::new(FormatRule),
        Box::new(DuplicateSensitivity),
    ]
}

fn present_fraction(flags: &[bool]) -> f64 {
    if flags.is_empty() {
        return 1.0;
    }
    flags.iter().filter(|p| **p).count() as f64 / flags.len() as f64
}

fn char_len(s: &str) -> usize {
    s.trim().chars().count()
}

/// Title and category present; some content at all
pub struct RequiredFields;

impl ValidationRule for RequiredFields {
    fn name(&self) -> &'static str {
        "required_fields"
    }

    fn check(&self, entity: &NormalizedEntity, _ctx: &RuleContext<'_>) -> RuleOutcome {
        let has_title = entity.display_title().is_some();
        let has_category = non_empty(entity.category.as_deref()).is_some();
        let has_body = non_empty(entity.body_localized.as_deref()).is_some()
            || non_empty(entity.excerpt.as_deref()).is_some();

        let mut findings = Vec::new();
        if !has_title && !has_body {
            findings.push(Finding::new(
                "body_localized",
                IssueCode::MissingContent,
                "Entity has no title and no content",
            ));
        } else if !has_title {
            findings.push(Finding::new(
                "title_primary",
                IssueCode::MissingTitle,
                "No primary or localized title",
            ));
        }
        if !has_category {
            findings.push(Finding::new(
                "category",
                IssueCode::MissingCategory,
                "Category is missing",
            ));
        }

        RuleOutcome {
            findings,
            confidence: present_fraction(&[has_title, has_category]),
        }
    }
}

/// Localized body ⇒ non-empty localized title; an explicitly empty localized title is flagged too
pub struct LocalizedConsistency;

impl ValidationRule for LocalizedConsistency {
    fn name(&self) -> &'static str {
        "localized_consistency"
    }

    fn check(&self, entity: &NormalizedEntity, _ctx: &RuleContext<'_>) -> RuleOutcome {
        let title = non_empty(entity.title_localized.as_deref());
        let body = non_empty(entity.body_localized.as_deref());
        let explicitly_blank = entity.title_localized.is_some() && title.is_none();

        let mut findings = Vec::new();
        if title.is_none() && (body.is_some() || explicitly_blank) {
            findings.push(Finding::new(
                "title_localized",
                IssueCode::EmptyLocalizedTitle,
                "Localized title is empty",
            ));
        }

        RuleOutcome {
            findings,
            confidence: present_fraction(&[title.is_some(), body.is_some()]),
        }
    }
}

/// Title, excerpt and body length limits
pub struct LengthBounds;

impl ValidationRule for LengthBounds {
    fn name(&self) -> &'static str {
        "length_bounds"
    }

    fn check(&self, entity: &NormalizedEntity, ctx: &RuleContext<'_>) -> RuleOutcome {
        let bounds = ctx.bounds;
        let mut findings = Vec::new();

        let titles = [
            ("title_primary", non_empty(entity.title_primary.as_deref())),
            ("title_localized", non_empty(entity.title_localized.as_deref())),
        ];
        for (field, title) in titles {
            let Some(title) = title else { continue };
            let len = char_len(title);
            if len < bounds.title_min_chars {
                findings.push(Finding::new(
                    field,
                    IssueCode::TitleTooShort,
                    format!("Title has {} chars, minimum is {}", len, bounds.title_min_chars),
                ));
            } else if len > bounds.title_max_chars {
                findings.push(Finding::new(
                    field,
                    IssueCode::TitleTooLong,
                    format!("Title has {} chars, maximum is {}", len, bounds.title_max_chars),
                ));
            }
        }

        let excerpt = non_empty(entity.excerpt.as_deref());
        if let Some(excerpt) = excerpt {
            let len = char_len(excerpt);
            if len > bounds.excerpt_max_chars {
                findings.push(Finding::new(
                    "excerpt",
                    IssueCode::ExcerptTooLong,
                    format!("Excerpt has {} chars, maximum is {}", len, bounds.excerpt_max_chars),
                ));
            }
        }

        let body = non_empty(entity.body_localized.as_deref());
        if let Some(body) = body {
            let len = char_len(body);
            if len < bounds.body_min_chars {
                findings.push(Finding::new(
                    "body_localized",
                    IssueCode::BodyTooShort,
                    format!("Body has {} chars, minimum is {}", len, bounds.body_min_chars),
                ));
            }
        }

        RuleOutcome {
            findings,
            confidence: present_fraction(&[
                entity.display_title().is_some(),
                excerpt.is_some(),
                body.is_some(),
            ]),
        }
    }
}

/// URL-safe slug, http(s) image URL
pub struct FormatRule;

impl ValidationRule for FormatRule {
    fn name(&self) -> &'static str {
        "format"
    }

    fn check(&self, entity: &NormalizedEntity, _ctx: &RuleContext<'_>) -> RuleOutcome {
        let mut findings = Vec::new();

        if entity.slug.is_empty() || slugify(&entity.slug) != entity.slug {
            findings.push(Finding::new(
                "slug",
                IssueCode::InvalidSlug,
                format!("Slug '{}' is not URL-safe", entity.slug),
            ));
        }

        let image = non_empty(entity.image_url.as_deref());
        if let Some(url) = image {
            let url = url.trim();
            let valid = (url.starts_with("https://") || url.starts_with("http://"))
                && !url.contains(char::is_whitespace);
            if !valid {
                findings.push(Finding::new(
                    "image_url",
                    IssueCode::InvalidImageUrl,
                    format!("Image URL '{}' is not http(s)", url),
                ));
            }
        }

        RuleOutcome {
            findings,
            confidence: present_fraction(&[!entity.slug.is_empty(), image.is_some()]),
        }
    }
}

/// Boilerplate titles, duplicated content, sensitive terms
pub struct DuplicateSensitivity;

impl ValidationRule for DuplicateSensitivity {
    fn name(&self) -> &'static str {
        "duplicate_sensitivity"
    }

    fn check(&self, entity: &NormalizedEntity, ctx: &RuleContext<'_>) -> RuleOutcome {
        let mut findings = Vec::new();

        let titles = [
            ("title_primary", non_empty(entity.title_primary.as_deref())),
            ("title_localized", non_empty(entity.title_localized.as_deref())),
        ];
        for (field, title) in titles {
            let Some(title) = title else { continue };
            let is_slug = !entity.slug.is_empty() && title.trim() == entity.slug;
            if ctx.tables.is_placeholder_title(title) || is_slug {
                findings.push(Finding::new(
                    field,
                    IssueCode::PlaceholderTitle,
                    format!("Title '{}' is a placeholder", title.trim()),
                ));
            }
        }

        let title = entity.display_title();
        let excerpt = non_empty(entity.excerpt.as_deref());
        let body = non_empty(entity.body_localized.as_deref());

        if let (Some(t), Some(e)) = (title, excerpt) {
            if t.trim().eq_ignore_ascii_case(e.trim()) {
                findings.push(Finding::new(
                    "excerpt",
                    IssueCode::DuplicateContent,
                    "Excerpt duplicates the title",
                ));
            }
        }
        if let (Some(t), Some(b)) = (non_empty(entity.title_localized.as_deref()), body) {
            if t.trim() == b.trim() {
                findings.push(Finding::new(
                    "body_localized",
                    IssueCode::DuplicateContent,
                    "Body duplicates the localized title",
                ));
            }
        }

        if let Some((field, term)) = ctx.tables.entity_sensitive_match(entity) {
            findings.push(Finding::new(
                field,
                IssueCode::SensitiveContent,
                format!("Sensitive term '{}' present", term),
            ));
        }

        RuleOutcome {
            findings,
            confidence: present_fraction(&[title.is_some(), body.is_some()]),
        }
    }
}
