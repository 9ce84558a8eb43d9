//! Per-entity pipeline orchestration
//!
//! Sequence for one entity:
//! Fetch → Normalize → Validate → (not READY) Images + Variants → Score
//!
//! Steps within one entity are sequential because later steps read fields
//! earlier ones populated. Entities share nothing mutable, so bulk work fans
//! out through [`BulkRunner`].
//!
//! Nothing here writes to the store; the operator commands own write-back.

use crate::config::{EiConfig, PipelineSettings, ScoringConfig};
use crate::error::PipelineResult;
use crate::images::{ImageIntelligence, ImageProvider, ImageQuery, ImageSelection};
use crate::knowledge::KnowledgeTables;
use crate::normalizer::normalize;
use crate::scoring::{calculate_editorial_score, comparable_window, ComparableEntity};
use crate::sources::{EntityQuery, SourceAdapter, SourceFetcher};
use crate::store::{ContentStore, ListFilter, ListOrder, Page};
use crate::synthesis::SynthesisEngine;
use crate::types::{
    EditorialScoreResult, EntityId, EntityStatus, NormalizedEntity, SourceFragment,
    ValidationResult, Variant,
};
use crate::validator::Validator;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one full pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// Entity including working state (variants, image candidates)
    pub entity: NormalizedEntity,
    pub validation: ValidationResult,
    /// Present when the entity has no external rating
    pub editorial: Option<EditorialScoreResult>,
    /// Fragments returned by providers on this run
    pub fragments_fetched: usize,
    /// Previous fragments kept because their provider returned nothing
    pub fragments_carried: usize,
}

pub struct Pipeline {
    store: Arc<dyn ContentStore>,
    fetcher: SourceFetcher,
    validator: Arc<Validator>,
    images: ImageIntelligence,
    synthesis: SynthesisEngine,
    tables: Arc<KnowledgeTables>,
    settings: PipelineSettings,
    scoring: ScoringConfig,
}

impl Pipeline {
    /// Wire every component from configuration
    ///
    /// Tables are built once here and shared by every component.
    pub fn new(
        store: Arc<dyn ContentStore>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        image_providers: Vec<Arc<dyn ImageProvider>>,
        config: &EiConfig,
    ) -> PipelineResult<Self> {
        let tables = Arc::new(KnowledgeTables::with_overrides(&config.tables)?);
        let validator = Arc::new(Validator::new(&config.validation, Arc::clone(&tables))?);

        info!(
            adapters = adapters.len(),
            image_providers = image_providers.len(),
            worker_limit = config.pipeline.worker_limit,
            "Pipeline initialized"
        );

        Ok(Self {
            store,
            fetcher: SourceFetcher::new(adapters, config.retry.clone()),
            images: ImageIntelligence::new(
                Arc::clone(&tables),
                image_providers,
                &config.pipeline,
                config.retry.clone(),
            ),
            synthesis: SynthesisEngine::new(Arc::clone(&validator), Arc::clone(&tables)),
            validator,
            tables,
            settings: config.pipeline.clone(),
            scoring: config.scoring.clone(),
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.fetcher.names()
    }

    pub fn tables(&self) -> &KnowledgeTables {
        &self.tables
    }

    pub fn validate(&self, entity: &NormalizedEntity) -> ValidationResult {
        self.validator.validate(entity)
    }

    pub async fn select_images(&self, entity: &NormalizedEntity) -> ImageSelection {
        let query = ImageQuery::for_entity(entity, &self.tables);
        self.images.select_best_image(&query).await
    }

    pub fn generate_variants(&self, entity: &NormalizedEntity) -> Vec<Variant> {
        let ctx = self.synthesis.context_for(entity);
        self.synthesis
            .generate_variants(&ctx, self.settings.variant_count)
    }

    /// Full pipeline for a stored entity
    ///
    /// `NotFound` only when no fragment at all could be gathered.
    pub async fn run(&self, current: &NormalizedEntity) -> PipelineResult<PipelineOutcome> {
        let id = current.id;
        info!(entity_id = %id, slug = %current.slug, "Pipeline run starting");

        // Fetch
        let query = EntityQuery::for_entity(current);
        let fresh = self.fetcher.fetch_all(&query).await;
        let fragments_fetched = fresh.len();
        let fragments = carry_forward(fresh, &current.sources);
        let fragments_carried = fragments.len() - fragments_fetched;

        // Normalize
        let mut entity = normalize(id, fragments)?;

        // Validate
        let mut validation = self.validator.validate(&entity);

        // Fill a missing image, or offer alternatives when not ready
        if entity.image_url.is_none() || validation.status != EntityStatus::Ready {
            let selection = self.select_images(&entity).await;
            if entity.image_url.is_none() {
                debug!(
                    entity_id = %id,
                    url = %selection.selected.url,
                    source = ?selection.selected.source,
                    "Filling missing image"
                );
                entity.image_url = Some(selection.selected.url.clone());
                entity.image_source = Some(selection.selected.source);
                validation = self.validator.validate(&entity);
            }
            entity.image_candidates = selection.candidates;
        }

        entity.status = validation.status;
        entity.validation = Some(validation.clone());

        if validation.status != EntityStatus::Ready {
            entity.variants = self.generate_variants(&entity);
        }

        let editorial = match entity.external_rating {
            Some(_) => None,
            None => Some(self.editorial_score(&entity).await),
        };

        info!(
            entity_id = %id,
            status = %entity.status,
            fragments_fetched,
            fragments_carried,
            variants = entity.variants.len(),
            image_candidates = entity.image_candidates.len(),
            "Pipeline run complete"
        );

        Ok(PipelineOutcome {
            entity,
            validation,
            editorial,
            fragments_fetched,
            fragments_carried,
        })
    }

    /// Editorial score against stored comparables
    pub async fn editorial_score(&self, entity: &NormalizedEntity) -> EditorialScoreResult {
        let comparables = self.comparables_for(entity).await;
        calculate_editorial_score(entity, &comparables, &self.tables, &self.scoring)
    }

    /// Stored entities sharing the primary contributor inside the window,
    /// closest release years first
    ///
    /// A store failure degrades to "no comparables".
    async fn comparables_for(&self, entity: &NormalizedEntity) -> Vec<ComparableEntity> {
        let Some(contributor) = entity.primary_contributor() else {
            return Vec::new();
        };

        let filter = ListFilter {
            primary_contributor: Some(contributor.name.clone()),
            release_years: entity
                .release_year
                .map(|year| comparable_window(year, &self.scoring)),
            order: entity
                .release_year
                .map_or(ListOrder::Slug, ListOrder::NearestYear),
            ..ListFilter::default()
        };

        // One extra row in case the entity itself is stored
        let limit = self.scoring.comparable_limit;
        match self
            .store
            .list(&filter, Page::new(0, limit.saturating_add(1)))
            .await
        {
            Ok(rows) => rows
                .iter()
                .filter(|row| row.id() != entity.id)
                .filter_map(|row| ComparableEntity::from_entity(&row.entity, row.editorial.as_ref()))
                .take(limit as usize)
                .collect(),
            Err(e) => {
                warn!(entity_id = %entity.id, error = %e, "Comparable lookup failed, scoring without");
                Vec::new()
            }
        }
    }
}

/// Fresh fragments, plus previous ones whose provider returned nothing now
fn carry_forward(mut fresh: Vec<SourceFragment>, previous: &[SourceFragment]) -> Vec<SourceFragment> {
    let carried: Vec<SourceFragment> = previous
        .iter()
        .filter(|old| !fresh.iter().any(|f| f.source == old.source))
        .cloned()
        .collect();
    fresh.extend(carried);
    fresh
}

/// Bounded-concurrency runner for per-entity work
#[derive(Debug, Clone, Copy)]
pub struct BulkRunner {
    limit: usize,
}

impl BulkRunner {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `task` for every id, at most `limit` at a time
    ///
    /// Results come back in input order.
    pub async fn run<F, Fut, T>(&self, ids: Vec<EntityId>, task: F) -> Vec<(EntityId, T)>
    where
        F: Fn(EntityId) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut results: Vec<(usize, EntityId, T)> = stream::iter(ids.into_iter().enumerate())
            .map(|(index, id)| {
                let work = task(id);
                async move { (index, id, work.await) }
            })
            .buffer_unordered(self.limit)
            .collect()
            .await;

        results.sort_by_key(|(index, _, _)| *index);
        results.into_iter().map(|(_, id, out)| (id, out)).collect()
    }
}
