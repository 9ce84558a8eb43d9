//! Normalizer
//!
//! Merges provider fragments into one [`NormalizedEntity`].
//!
//! # Merge Policy
//! For each field, independently:
//! 1. Consider only fragments with a non-empty value
//! 2. Highest fragment confidence wins
//! 3. Ties: provider priority (internal > primary metadata > secondary)
//! 4. Still tied: earlier fragment wins
//!
//! Every fragment is kept in `sources` with its full field map, so a value
//! that lost the merge is still recoverable. The winning fragment of each
//! field is recorded in `provenance`.

use crate::error::{PipelineError, PipelineResult};
use crate::types::{
    slugify, EditorialFlags, EntityId, EntityType, FieldProvenance, FragmentFields, ImageSource,
    NormalizedEntity, SourceFragment,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Merge `fragments` into a canonical entity
///
/// Pure. Fails only when there is nothing to merge (identity unresolvable).
pub fn normalize(id: EntityId, fragments: Vec<SourceFragment>) -> PipelineResult<NormalizedEntity> {
    if fragments.is_empty() {
        return Err(PipelineError::not_found(id));
    }

    debug!(entity_id = %id, fragment_count = fragments.len(), "Starting normalization");

    let mut merger = FieldMerger::new(&fragments);

    let title_primary = merger.text("title_primary", |f| f.title_primary.as_ref());
    let title_localized = merger.text("title_localized", |f| f.title_localized.as_ref());
    let body_localized = merger.text("body_localized", |f| f.body_localized.as_ref());
    let excerpt = merger.text("excerpt", |f| f.excerpt.as_ref());
    let category = merger.text("category", |f| f.category.as_ref());
    let slug = merger.text("slug", |f| f.slug.as_ref());
    let entity_type = merger.pick("entity_type", |f| f.entity_type);
    let genres = merger
        .pick("genres", |f| Some(f.genres.clone()).filter(|g| !g.is_empty()))
        .unwrap_or_default();
    let release_year = merger.pick("release_year", |f| f.release_year);
    let contributors = merger
        .pick("contributors", |f| {
            Some(f.contributors.clone()).filter(|c| !c.is_empty())
        })
        .unwrap_or_default();
    let external_rating = merger.pick("external_rating", |f| f.external_rating);
    // Each flag merges on its own; a set flag from any fragment survives
    let mut flag = |field: &str, get: fn(&EditorialFlags) -> bool| {
        merger
            .pick(field, |f| f.flags.as_ref().map(get).filter(|set| *set))
            .unwrap_or(false)
    };
    let flags = EditorialFlags {
        classic: flag("flags.classic", |fl| fl.classic),
        blockbuster: flag("flags.blockbuster", |fl| fl.blockbuster),
        underrated: flag("flags.underrated", |fl| fl.underrated),
    };
    let popularity = merger.pick("popularity", |f| f.popularity);

    let image = merger.pick("image_url", |f| {
        f.image_url
            .as_ref()
            .filter(|u| !u.trim().is_empty())
            .map(|u| (u.clone(), f.image_source))
    });
    let (image_url, image_source) = match image {
        Some((url, source)) => (Some(url), Some(source.unwrap_or(ImageSource::Provider))),
        None => (None, None),
    };

    // Ids are additive: every provider's id is kept, the best fragment wins a key
    let mut external_ids = BTreeMap::new();
    for idx in merger.ranked_indices() {
        for (provider, value) in &fragments[idx].fields.external_ids {
            external_ids
                .entry(provider.clone())
                .or_insert_with(|| value.clone());
        }
    }

    let slug = slug
        .or_else(|| title_primary.as_deref().map(slugify))
        .or_else(|| title_localized.as_deref().map(slugify))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| id.to_string());

    let provenance = merger.into_provenance();

    let mut entity = NormalizedEntity::new(id, entity_type.unwrap_or(EntityType::Post), slug);
    entity.title_primary = title_primary;
    entity.title_localized = title_localized;
    entity.body_localized = body_localized;
    entity.excerpt = excerpt;
    entity.category = category;
    entity.genres = genres;
    entity.release_year = release_year;
    entity.contributors = contributors;
    entity.external_rating = external_rating;
    entity.flags = flags;
    entity.popularity = popularity;
    entity.external_ids = external_ids;
    entity.image_url = image_url;
    entity.image_source = image_source;
    entity.provenance = provenance;
    entity.sources = fragments;

    debug!(
        entity_id = %id,
        merged_fields = entity.provenance.len(),
        "Normalization complete"
    );

    Ok(entity)
}

/// Per-field winner selection over one fragment list
struct FieldMerger<'a> {
    fragments: &'a [SourceFragment],
    provenance: BTreeMap<String, FieldProvenance>,
}

impl<'a> FieldMerger<'a> {
    fn new(fragments: &'a [SourceFragment]) -> Self {
        Self {
            fragments,
            provenance: BTreeMap::new(),
        }
    }

    /// Fragment indices, best first
    fn ranked_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.fragments.len()).collect();
        indices.sort_by(|&a, &b| compare_fragments(&self.fragments[a], &self.fragments[b]).then(a.cmp(&b)));
        indices
    }

    /// Winning value for `field`; `extract` returns `None` for "not present"
    fn pick<T, F>(&mut self, field: &str, extract: F) -> Option<T>
    where
        F: Fn(&FragmentFields) -> Option<T>,
    {
        let winner = self
            .ranked_indices()
            .into_iter()
            .find_map(|idx| extract(&self.fragments[idx].fields).map(|v| (idx, v)));

        let (idx, value) = winner?;
        let fragment = &self.fragments[idx];
        self.provenance.insert(
            field.to_string(),
            FieldProvenance {
                source: fragment.source.clone(),
                confidence: fragment.confidence,
            },
        );
        Some(value)
    }

    /// Non-blank text field, logging conflicting values from losing fragments
    fn text<F>(&mut self, field: &str, extract: F) -> Option<String>
    where
        F: Fn(&FragmentFields) -> Option<&String>,
    {
        let present = |f: &FragmentFields| extract(f).filter(|v| !v.trim().is_empty()).cloned();
        let winner = self.pick(field, present)?;

        for fragment in self.fragments {
            if let Some(other) = present(&fragment.fields) {
                if other != winner {
                    let similarity =
                        strsim::normalized_levenshtein(&winner.to_lowercase(), &other.to_lowercase());
                    debug!(
                        field,
                        source = %fragment.source,
                        similarity,
                        "Merged-away value differs from winner"
                    );
                }
            }
        }

        Some(winner)
    }

    fn into_provenance(self) -> BTreeMap<String, FieldProvenance> {
        self.provenance
    }
}

/// Ordering where the better fragment sorts first
fn compare_fragments(a: &SourceFragment, b: &SourceFragment) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.kind.priority().cmp(&b.kind.priority()))
}
