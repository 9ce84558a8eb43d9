//! Operator commands
//!
//! Structured entry points invoked by the admin layer. Each command reads the
//! stored entity, runs the relevant pipeline step and, where it changes
//! persisted fields, writes a version-guarded partial update.
//!
//! Variants and image candidates are working state: they live in the
//! [`WorkingSet`] only, and apply clears them.
//!
//! `WriteConflict` from the store is surfaced as-is. Serializing commands on
//! the same entity is the caller's job.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{BulkRunner, Pipeline, PipelineOutcome};
use crate::store::{ContentStore, EntityPatch, StoredEntity};
use crate::types::{
    EditorialScoreResult, EntityId, EntityStatus, FieldProvenance, ImageCandidate, ImageSource,
    NormalizedEntity, ValidationResult, Variant,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Per-entity working state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingState {
    pub variants: Vec<Variant>,
    pub image_candidates: Vec<ImageCandidate>,
}

/// Working state for every entity currently under review
#[derive(Debug, Default)]
pub struct WorkingSet {
    inner: RwLock<HashMap<EntityId, WorkingState>>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: EntityId) -> WorkingState {
        self.inner.read().await.get(&id).cloned().unwrap_or_default()
    }

    pub async fn set_variants(&self, id: EntityId, variants: Vec<Variant>) {
        self.inner.write().await.entry(id).or_default().variants = variants;
    }

    pub async fn set_image_candidates(&self, id: EntityId, candidates: Vec<ImageCandidate>) {
        self.inner.write().await.entry(id).or_default().image_candidates = candidates;
    }

    pub async fn clear(&self, id: EntityId) {
        self.inner.write().await.remove(&id);
    }

    /// Number of entities holding working state
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Image choice for apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageChoice {
    pub url: String,
    /// Used only when the URL is not a known candidate
    #[serde(default)]
    pub source: Option<ImageSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyRequest {
    #[serde(default)]
    pub variant: Option<Variant>,
    #[serde(default)]
    pub image: Option<ImageChoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub entity: StoredEntity,
    /// False when the entity already held the applied values
    pub changed: bool,
}

/// What happened to one id in a bulk command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum BulkOutcome {
    Applied,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItem {
    pub id: EntityId,
    #[serde(flatten)]
    pub outcome: BulkOutcome,
}

/// Per-item bulk report; one bad item never fails the batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkReport {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<BulkItem>,
}

impl BulkReport {
    fn from_items(items: Vec<BulkItem>) -> Self {
        let mut report = Self::default();
        for item in &items {
            match item.outcome {
                BulkOutcome::Applied => report.applied += 1,
                BulkOutcome::Skipped(_) => report.skipped += 1,
                BulkOutcome::Failed(_) => report.failed += 1,
            }
        }
        report.items = items;
        report
    }
}

pub struct OperatorService {
    store: Arc<dyn ContentStore>,
    pipeline: Arc<Pipeline>,
    working: WorkingSet,
    bulk: BulkRunner,
}

impl OperatorService {
    pub fn new(store: Arc<dyn ContentStore>, pipeline: Arc<Pipeline>) -> Self {
        let bulk = BulkRunner::new(pipeline.settings().worker_limit);
        Self {
            store,
            pipeline,
            working: WorkingSet::new(),
            bulk,
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working
    }

    /// Stored entity; a missing entity also drops its working state
    async fn load(&self, id: EntityId) -> PipelineResult<StoredEntity> {
        match self.store.get(id).await {
            Err(PipelineError::NotFound(msg)) => {
                self.working.clear(id).await;
                Err(PipelineError::NotFound(msg))
            }
            other => other,
        }
    }

    /// Re-validate and persist status/validation if they changed
    pub async fn validate(&self, id: EntityId) -> PipelineResult<ValidationResult> {
        let stored = self.load(id).await?;
        let validation = self.pipeline.validate(&stored.entity);

        let mut after = stored.entity.clone();
        after.status = validation.status;
        after.validation = Some(validation.clone());
        self.write_diff(&stored, &after, None).await?;

        if validation.status == EntityStatus::Ready {
            self.working.clear(id).await;
        }

        Ok(validation)
    }

    /// Fresh variants for an entity that is not ready
    pub async fn regenerate(&self, id: EntityId) -> PipelineResult<Vec<Variant>> {
        let stored = self.load(id).await?;
        let mut entity = stored.entity;
        let validation = self.pipeline.validate(&entity);

        if validation.status == EntityStatus::Ready {
            debug!(entity_id = %id, "Entity is ready, no variants needed");
            self.working.set_variants(id, Vec::new()).await;
            return Ok(Vec::new());
        }

        entity.status = validation.status;
        entity.validation = Some(validation);
        let variants = self.pipeline.generate_variants(&entity);
        info!(entity_id = %id, count = variants.len(), "Variants regenerated");

        self.working.set_variants(id, variants.clone()).await;
        Ok(variants)
    }

    pub async fn list_variants(&self, id: EntityId) -> PipelineResult<Vec<Variant>> {
        self.load(id).await?;
        Ok(self.working.get(id).await.variants)
    }

    /// Working candidates, computed on first request
    pub async fn list_images(&self, id: EntityId) -> PipelineResult<Vec<ImageCandidate>> {
        let stored = self.load(id).await?;
        let cached = self.working.get(id).await.image_candidates;
        if !cached.is_empty() {
            return Ok(cached);
        }

        let selection = self.pipeline.select_images(&stored.entity).await;
        self.working
            .set_image_candidates(id, selection.candidates.clone())
            .await;
        Ok(selection.candidates)
    }

    /// Write the chosen variant and/or image, then re-derive status
    ///
    /// Idempotent: applying the same choice again writes nothing.
    pub async fn apply(&self, id: EntityId, request: &ApplyRequest) -> PipelineResult<ApplyOutcome> {
        if request.variant.is_none() && request.image.is_none() {
            return Err(PipelineError::InvalidInput(
                "apply needs a variant, an image, or both".to_string(),
            ));
        }

        let stored = self.load(id).await?;
        let mut after = stored.entity.clone();

        if let Some(variant) = &request.variant {
            variant.apply_to(&mut after);
        }

        if let Some(choice) = &request.image {
            let url = choice.url.trim();
            if url.is_empty() {
                return Err(PipelineError::InvalidInput("image url is empty".to_string()));
            }
            let source = self.image_source_for(&stored.entity, url, choice.source).await;
            if after.image_url.as_deref() != Some(url) || after.image_source != Some(source) {
                after.image_url = Some(url.to_string());
                after.image_source = Some(source);
                after.provenance.insert(
                    "image_url".to_string(),
                    FieldProvenance {
                        source: "operator".to_string(),
                        confidence: 1.0,
                    },
                );
            }
        }

        let validation = self.pipeline.validate(&after);
        after.status = validation.status;
        after.validation = Some(validation);

        let (entity, changed) = match self.write_diff(&stored, &after, None).await? {
            Some(updated) => (updated, true),
            None => (stored, false),
        };
        self.working.clear(id).await;

        info!(
            entity_id = %id,
            changed,
            status = %entity.entity.status,
            "Apply complete"
        );

        Ok(ApplyOutcome { entity, changed })
    }

    /// Candidate source, else the stored source for the same URL, else the
    /// caller's hint, else manual
    async fn image_source_for(
        &self,
        current: &NormalizedEntity,
        url: &str,
        hint: Option<ImageSource>,
    ) -> ImageSource {
        let working = self.working.get(current.id).await;
        working
            .image_candidates
            .iter()
            .find(|c| c.url == url)
            .map(|c| c.source)
            .or_else(|| {
                (current.image_url.as_deref() == Some(url))
                    .then_some(current.image_source)
                    .flatten()
            })
            .or(hint)
            .unwrap_or(ImageSource::Manual)
    }

    /// Publish every id that re-validates as READY
    pub async fn bulk_approve(&self, ids: Vec<EntityId>) -> BulkReport {
        let total = ids.len();
        let results = self.bulk.run(ids, |id| self.approve_one(id)).await;
        let report = BulkReport::from_items(
            results
                .into_iter()
                .map(|(id, outcome)| BulkItem { id, outcome })
                .collect(),
        );
        info!(
            total,
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failed,
            "Bulk approve complete"
        );
        report
    }

    async fn approve_one(&self, id: EntityId) -> BulkOutcome {
        let stored = match self.load(id).await {
            Ok(stored) => stored,
            Err(e) => return BulkOutcome::Failed(e.to_string()),
        };

        let validation = self.pipeline.validate(&stored.entity);
        if validation.status != EntityStatus::Ready {
            return BulkOutcome::Skipped(format!("status is {}", validation.status));
        }
        if stored.published {
            return BulkOutcome::Skipped("already published".to_string());
        }

        let mut after = stored.entity.clone();
        after.status = validation.status;
        after.validation = Some(validation);
        let mut patch = EntityPatch::diff(&stored.entity, &after);
        patch.published = Some(true);

        match self.store.update(id, stored.version, &patch).await {
            Ok(_) => {
                self.working.clear(id).await;
                BulkOutcome::Applied
            }
            Err(e) => {
                warn!(entity_id = %id, error = %e, "Bulk approve write failed");
                BulkOutcome::Failed(e.to_string())
            }
        }
    }

    /// Delete every id that is not published
    pub async fn bulk_delete(&self, ids: Vec<EntityId>) -> BulkReport {
        let total = ids.len();
        let results = self.bulk.run(ids, |id| self.delete_one(id)).await;
        let report = BulkReport::from_items(
            results
                .into_iter()
                .map(|(id, outcome)| BulkItem { id, outcome })
                .collect(),
        );
        info!(
            total,
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failed,
            "Bulk delete complete"
        );
        report
    }

    async fn delete_one(&self, id: EntityId) -> BulkOutcome {
        let stored = match self.load(id).await {
            Ok(stored) => stored,
            Err(e) => return BulkOutcome::Failed(e.to_string()),
        };
        if stored.published {
            return BulkOutcome::Skipped("published".to_string());
        }

        match self.store.delete(id, stored.version).await {
            Ok(()) => {
                self.working.clear(id).await;
                BulkOutcome::Applied
            }
            Err(e) => BulkOutcome::Failed(e.to_string()),
        }
    }

    /// Full pipeline, persisted fields written back, working state refreshed
    pub async fn rerun(&self, id: EntityId) -> PipelineResult<PipelineOutcome> {
        let stored = self.load(id).await?;
        let outcome = self.pipeline.run(&stored.entity).await?;

        let editorial = outcome
            .editorial
            .clone()
            .filter(|e| stored.editorial.as_ref() != Some(e));
        self.write_diff(&stored, &outcome.entity, editorial).await?;

        self.working.clear(id).await;
        self.working
            .set_variants(id, outcome.entity.variants.clone())
            .await;
        self.working
            .set_image_candidates(id, outcome.entity.image_candidates.clone())
            .await;

        Ok(outcome)
    }

    /// Compute the editorial score and store it as the latest snapshot
    pub async fn score(&self, id: EntityId) -> PipelineResult<EditorialScoreResult> {
        let stored = self.load(id).await?;
        let result = self.pipeline.editorial_score(&stored.entity).await;

        if stored.editorial.as_ref() != Some(&result) {
            let patch = EntityPatch {
                editorial: Some(result.clone()),
                ..EntityPatch::default()
            };
            self.store.update(id, stored.version, &patch).await?;
        }

        debug!(
            entity_id = %id,
            score = result.score,
            confidence = result.confidence,
            needs_review = result.needs_review,
            "Editorial score computed"
        );
        Ok(result)
    }

    /// Write the difference between `stored` and `after`, if any
    async fn write_diff(
        &self,
        stored: &StoredEntity,
        after: &NormalizedEntity,
        editorial: Option<EditorialScoreResult>,
    ) -> PipelineResult<Option<StoredEntity>> {
        let mut patch = EntityPatch::diff(&stored.entity, after);
        patch.editorial = editorial;
        if patch.is_empty() {
            return Ok(None);
        }
        self.store
            .update(stored.id(), stored.version, &patch)
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_report_counts() {
        let items = vec![
            BulkItem {
                id: EntityId::new(),
                outcome: BulkOutcome::Applied,
            },
            BulkItem {
                id: EntityId::new(),
                outcome: BulkOutcome::Skipped("status is REJECTED".into()),
            },
            BulkItem {
                id: EntityId::new(),
                outcome: BulkOutcome::Failed("boom".into()),
            },
        ];
        let report = BulkReport::from_items(items);
        assert_eq!((report.applied, report.skipped, report.failed), (1, 1, 1));
        assert_eq!(report.items.len(), 3);
    }

    #[test]
    fn test_bulk_item_json_shape() {
        let item = BulkItem {
            id: EntityId::new(),
            outcome: BulkOutcome::Skipped("published".into()),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["reason"], "published");
    }

    #[tokio::test]
    async fn test_working_set_lifecycle() {
        let working = WorkingSet::new();
        let id = EntityId::new();
        assert_eq!(working.get(id).await, WorkingState::default());

        working
            .set_image_candidates(
                id,
                vec![ImageCandidate {
                    url: "https://img.example/1.jpg".into(),
                    source: ImageSource::Stock,
                    provider: "mock".into(),
                    score: 0.7,
                }],
            )
            .await;
        assert_eq!(working.get(id).await.image_candidates.len(), 1);

        working.clear(id).await;
        assert!(working.get(id).await.image_candidates.is_empty());
    }
}
