//! Content datastore access
//!
//! [`ContentStore`] is the only way the pipeline reads or writes persisted
//! entities. Writes are partial ([`EntityPatch`]) and guarded by an
//! optimistic `version` token: a stale `expected_version` yields
//! `PipelineError::WriteConflict`, which is surfaced and never retried here.
//! Serializing writers per entity is the caller's job.

pub mod sqlite;

pub use sqlite::SqliteContentStore;

use crate::error::PipelineResult;
use crate::types::{
    Contributor, EditorialFlags, EditorialScoreResult, EntityId, EntityStatus, EntityType,
    FieldProvenance, ImageSource, NormalizedEntity, SourceFragment, ValidationResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::Path;

/// Persisted entity plus store-owned bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntity {
    /// Working state (variants, candidates) is always empty here
    pub entity: NormalizedEntity,
    /// Optimistic concurrency token, bumped on every write
    pub version: i64,
    pub published: bool,
    /// Last applied editorial score snapshot
    pub editorial: Option<EditorialScoreResult>,
}

impl StoredEntity {
    pub fn id(&self) -> EntityId {
        self.entity.id
    }
}

/// Partial field update
///
/// `Some` sets the field, `None` leaves it untouched. Clearing a stored value
/// is not expressible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPatch {
    pub title_primary: Option<String>,
    pub title_localized: Option<String>,
    pub body_localized: Option<String>,
    pub excerpt: Option<String>,
    pub category: Option<String>,
    pub genres: Option<Vec<String>>,
    pub release_year: Option<i32>,
    pub contributors: Option<Vec<Contributor>>,
    pub external_rating: Option<f64>,
    pub flags: Option<EditorialFlags>,
    pub popularity: Option<f64>,
    pub external_ids: Option<BTreeMap<String, String>>,
    pub image_url: Option<String>,
    pub image_source: Option<ImageSource>,
    pub sources: Option<Vec<SourceFragment>>,
    pub provenance: Option<BTreeMap<String, FieldProvenance>>,
    pub status: Option<EntityStatus>,
    pub validation: Option<ValidationResult>,
    pub editorial: Option<EditorialScoreResult>,
    pub published: Option<bool>,
}

impl EntityPatch {
    /// Patch that turns `before` into `after` (fields set in `after` only)
    pub fn diff(before: &NormalizedEntity, after: &NormalizedEntity) -> Self {
        Self {
            title_primary: changed_opt(&before.title_primary, &after.title_primary),
            title_localized: changed_opt(&before.title_localized, &after.title_localized),
            body_localized: changed_opt(&before.body_localized, &after.body_localized),
            excerpt: changed_opt(&before.excerpt, &after.excerpt),
            category: changed_opt(&before.category, &after.category),
            genres: changed(&before.genres, &after.genres),
            release_year: changed_opt(&before.release_year, &after.release_year),
            contributors: changed(&before.contributors, &after.contributors),
            external_rating: changed_opt(&before.external_rating, &after.external_rating),
            flags: changed(&before.flags, &after.flags),
            popularity: changed_opt(&before.popularity, &after.popularity),
            external_ids: changed(&before.external_ids, &after.external_ids),
            image_url: changed_opt(&before.image_url, &after.image_url),
            image_source: changed_opt(&before.image_source, &after.image_source),
            sources: changed(&before.sources, &after.sources),
            provenance: changed(&before.provenance, &after.provenance),
            status: changed(&before.status, &after.status),
            validation: changed_opt(&before.validation, &after.validation),
            editorial: None,
            published: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Write every set field onto `stored`
    pub fn apply_to(&self, stored: &mut StoredEntity) {
        let entity = &mut stored.entity;
        set_opt(&mut entity.title_primary, &self.title_primary);
        set_opt(&mut entity.title_localized, &self.title_localized);
        set_opt(&mut entity.body_localized, &self.body_localized);
        set_opt(&mut entity.excerpt, &self.excerpt);
        set_opt(&mut entity.category, &self.category);
        set(&mut entity.genres, &self.genres);
        set_opt(&mut entity.release_year, &self.release_year);
        set(&mut entity.contributors, &self.contributors);
        set_opt(&mut entity.external_rating, &self.external_rating);
        set(&mut entity.flags, &self.flags);
        set_opt(&mut entity.popularity, &self.popularity);
        set(&mut entity.external_ids, &self.external_ids);
        set_opt(&mut entity.image_url, &self.image_url);
        set_opt(&mut entity.image_source, &self.image_source);
        set(&mut entity.sources, &self.sources);
        set(&mut entity.provenance, &self.provenance);
        set(&mut entity.status, &self.status);
        set_opt(&mut entity.validation, &self.validation);
        set_opt(&mut stored.editorial, &self.editorial);
        set(&mut stored.published, &self.published);
        entity.clear_working_state();
    }
}

fn changed<T: PartialEq + Clone>(before: &T, after: &T) -> Option<T> {
    (before != after).then(|| after.clone())
}

fn changed_opt<T: PartialEq + Clone>(before: &Option<T>, after: &Option<T>) -> Option<T> {
    if before != after {
        after.clone()
    } else {
        None
    }
}

fn set<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if let Some(v) = value {
        *target = Some(v.clone());
    }
}

/// List filter; unset fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListFilter {
    pub status: Option<EntityStatus>,
    pub category: Option<String>,
    pub entity_type: Option<EntityType>,
    /// Case-insensitive primary contributor name
    pub primary_contributor: Option<String>,
    /// Inclusive release year range
    pub release_years: Option<(i32, i32)>,
    pub published: Option<bool>,
    #[serde(default)]
    pub order: ListOrder,
}

/// Result ordering for [`ContentStore::list`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOrder {
    #[default]
    Slug,
    /// Closest release year first, newer before older on equal distance;
    /// entities without a year sort last
    NearestYear(i32),
}

/// Offset pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Page {
    pub const MAX_LIMIT: u32 = 500;

    pub fn new(offset: u32, limit: u32) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, 50)
    }
}

/// Content datastore collaborator
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Read one entity (`NotFound` if absent)
    async fn get(&self, id: EntityId) -> PipelineResult<StoredEntity>;

    /// Create a new entity at version 1
    async fn insert(&self, entity: &NormalizedEntity) -> PipelineResult<StoredEntity>;

    /// Partial update guarded by `expected_version`
    async fn update(
        &self,
        id: EntityId,
        expected_version: i64,
        patch: &EntityPatch,
    ) -> PipelineResult<StoredEntity>;

    /// Delete guarded by `expected_version`
    async fn delete(&self, id: EntityId, expected_version: i64) -> PipelineResult<()>;

    /// List entities matching `filter`, ordered by slug
    async fn list(&self, filter: &ListFilter, page: Page) -> PipelineResult<Vec<StoredEntity>>;
}

/// Open (creating if needed) the SQLite database at `db_path`
pub async fn init_database_pool(db_path: &Path) -> PipelineResult<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(mediq_common::Error::Io)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    sqlite::init_tables(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;

    fn entity() -> NormalizedEntity {
        let mut e = NormalizedEntity::new(EntityId::new(), EntityType::Post, "hello");
        e.title_primary = Some("Hello".to_string());
        e.category = Some("news".to_string());
        e
    }

    #[test]
    fn test_diff_of_identical_entities_is_empty() {
        let e = entity();
        assert!(EntityPatch::diff(&e, &e.clone()).is_empty());
    }

    #[test]
    fn test_diff_captures_changed_fields_only() {
        let before = entity();
        let mut after = before.clone();
        after.excerpt = Some("Short".to_string());
        after.status = EntityStatus::Ready;

        let patch = EntityPatch::diff(&before, &after);
        assert_eq!(patch.excerpt.as_deref(), Some("Short"));
        assert_eq!(patch.status, Some(EntityStatus::Ready));
        assert!(patch.title_primary.is_none());
        assert!(patch.category.is_none());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let before = entity();
        let mut after = before.clone();
        after.image_url = Some("https://img.example/a.jpg".to_string());
        let patch = EntityPatch::diff(&before, &after);

        let mut stored = StoredEntity {
            entity: before,
            version: 1,
            published: false,
            editorial: None,
        };
        patch.apply_to(&mut stored);
        let once = stored.clone();
        patch.apply_to(&mut stored);
        assert_eq!(stored, once);
        assert_eq!(stored.entity, after);
    }

    #[test]
    fn test_page_limit_is_clamped() {
        assert_eq!(Page::new(0, 0).limit, 1);
        assert_eq!(Page::new(0, 10_000).limit, Page::MAX_LIMIT);
    }
}
