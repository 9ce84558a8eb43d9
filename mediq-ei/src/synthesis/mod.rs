//! Synthesis Engine
//!
//! Proposes alternative title/summary/body bundles for entities that are not
//! ready, by recombining their attributes through templates. Every variant
//! records the template and inputs that produced it. Output is random on
//! purpose; what is guaranteed is that each returned variant passes the
//! Validator's blocking rules on the fields it sets.

pub mod templates;

use crate::knowledge::KnowledgeTables;
use crate::types::{non_empty, NormalizedEntity, Variant};
use crate::validator::Validator;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use templates::{render, Template, TEMPLATES};
use tracing::debug;
use uuid::Uuid;

/// Attempts allowed per requested variant
const ATTEMPTS_PER_VARIANT: usize = 4;

/// Entity plus the template inputs derived from it
#[derive(Debug, Clone)]
pub struct SynthesisContext {
    pub entity: NormalizedEntity,
    pub inputs: BTreeMap<String, String>,
}

pub struct SynthesisEngine {
    validator: Arc<Validator>,
    tables: Arc<KnowledgeTables>,
}

impl SynthesisEngine {
    pub fn new(validator: Arc<Validator>, tables: Arc<KnowledgeTables>) -> Self {
        Self { validator, tables }
    }

    /// Derive template inputs (title, topic, category, year, contributor, genre)
    pub fn context_for(&self, entity: &NormalizedEntity) -> SynthesisContext {
        let mut inputs = BTreeMap::new();

        let title = entity
            .display_title()
            .filter(|t| !self.tables.is_placeholder_title(t) && t.trim() != entity.slug);
        if let Some(title) = title {
            inputs.insert("title".to_string(), title.trim().to_string());
        }

        let category = non_empty(entity.category.as_deref()).map(|c| c.trim().replace('-', " "));
        if let Some(category) = &category {
            inputs.insert("category".to_string(), category.clone());
        }

        let text = [
            entity.title_primary.as_deref(),
            entity.title_localized.as_deref(),
            entity.body_localized.as_deref(),
            entity.excerpt.as_deref(),
        ]
        .iter()
        .flatten()
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
        let topic = self
            .tables
            .topic_keyword(&text)
            .map(str::to_string)
            .or_else(|| entity.primary_genre().map(str::to_string))
            .or(category);
        if let Some(topic) = topic {
            inputs.insert("topic".to_string(), topic);
        }

        if let Some(year) = entity.release_year {
            inputs.insert("year".to_string(), year.to_string());
        }
        if let Some(contributor) = entity.primary_contributor() {
            inputs.insert("contributor".to_string(), contributor.name.clone());
        }
        if let Some(genre) = entity.primary_genre() {
            inputs.insert("genre".to_string(), genre.to_lowercase());
        }

        SynthesisContext {
            entity: entity.clone(),
            inputs,
        }
    }

    /// Up to `count` valid variants, using the thread RNG
    pub fn generate_variants(&self, ctx: &SynthesisContext, count: usize) -> Vec<Variant> {
        self.generate_variants_with_rng(ctx, count, &mut rand::thread_rng())
    }

    /// Up to `count` valid variants
    ///
    /// At most `count × 4` attempts; duplicates and variants failing a
    /// blocking rule on their own fields are discarded.
    pub fn generate_variants_with_rng<R: Rng + ?Sized>(
        &self,
        ctx: &SynthesisContext,
        count: usize,
        rng: &mut R,
    ) -> Vec<Variant> {
        let eligible: Vec<&Template> = TEMPLATES
            .iter()
            .filter(|t| t.applies_to(ctx.entity.entity_type, &ctx.inputs))
            .collect();
        if eligible.is_empty() || count == 0 {
            debug!(entity_id = %ctx.entity.id, "No applicable variant templates");
            return Vec::new();
        }

        let needs_body = non_empty(ctx.entity.body_localized.as_deref()).is_none();
        let mut variants = Vec::new();
        let mut seen = HashSet::new();
        let mut discarded = 0usize;

        for _ in 0..count * ATTEMPTS_PER_VARIANT {
            if variants.len() >= count {
                break;
            }
            let Some(template) = eligible.choose(rng) else {
                break;
            };

            let variant = self.render_variant(template, ctx, needs_body);
            let key = (
                variant.title_primary.clone(),
                variant.title_localized.clone(),
                variant.excerpt.clone(),
            );
            if seen.contains(&key) {
                continue;
            }
            seen.insert(key);

            if self.passes_blocking_rules(&ctx.entity, &variant) {
                variants.push(variant);
            } else {
                discarded += 1;
            }
        }

        debug!(
            entity_id = %ctx.entity.id,
            generated = variants.len(),
            discarded,
            "Variant generation complete"
        );

        variants
    }

    fn render_variant(&self, template: &Template, ctx: &SynthesisContext, needs_body: bool) -> Variant {
        Variant {
            id: Uuid::new_v4(),
            template_id: template.id.to_string(),
            inputs: template.used_inputs(&ctx.inputs),
            title_primary: Some(render(template.title, &ctx.inputs)),
            title_localized: Some(render(template.title_localized, &ctx.inputs)),
            body_localized: template
                .body_localized
                .filter(|_| needs_body)
                .map(|body| render(body, &ctx.inputs)),
            excerpt: Some(render(template.excerpt, &ctx.inputs)),
        }
    }

    /// Variant applied to the entity has no blocking issue on its own fields
    pub fn passes_blocking_rules(&self, entity: &NormalizedEntity, variant: &Variant) -> bool {
        let mut candidate = entity.clone();
        variant.apply_to(&mut candidate);

        let mut fields = Vec::new();
        if variant.title_primary.is_some() {
            fields.push("title_primary");
        }
        if variant.title_localized.is_some() {
            fields.push("title_localized");
        }
        if variant.body_localized.is_some() {
            fields.push("body_localized");
        }
        if variant.excerpt.is_some() {
            fields.push("excerpt");
        }

        self.validator.blocking_issues_on(&candidate, &fields).is_empty()
    }
}
