//! Internal record adapter
//!
//! Turns the stored record into a fragment so it competes in the merge like
//! any other provider, at the highest priority.

use super::{EntityQuery, SourceAdapter};
use crate::error::{PipelineError, ProviderError};
use crate::store::ContentStore;
use crate::types::{FragmentFields, NormalizedEntity, ProviderKind, SourceFragment};
use async_trait::async_trait;
use std::sync::Arc;

pub const SOURCE_NAME: &str = "internal";

pub struct InternalRecordAdapter {
    store: Arc<dyn ContentStore>,
}

impl InternalRecordAdapter {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }
}

/// Every field the entity currently holds, as a fragment field map
pub fn fields_from_entity(entity: &NormalizedEntity) -> FragmentFields {
    FragmentFields {
        slug: Some(entity.slug.clone()).filter(|s| !s.is_empty()),
        entity_type: Some(entity.entity_type),
        title_primary: entity.title_primary.clone(),
        title_localized: entity.title_localized.clone(),
        body_localized: entity.body_localized.clone(),
        excerpt: entity.excerpt.clone(),
        category: entity.category.clone(),
        genres: entity.genres.clone(),
        release_year: entity.release_year,
        contributors: entity.contributors.clone(),
        external_rating: entity.external_rating,
        flags: entity.flags.any().then_some(entity.flags),
        popularity: entity.popularity,
        image_url: entity.image_url.clone(),
        image_source: entity.image_source,
        external_ids: entity.external_ids.clone(),
    }
}

#[async_trait]
impl SourceAdapter for InternalRecordAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Internal
    }

    async fn fetch(&self, query: &EntityQuery) -> Result<Option<SourceFragment>, ProviderError> {
        match self.store.get(query.id).await {
            Ok(stored) => Ok(Some(SourceFragment::new(
                SOURCE_NAME,
                ProviderKind::Internal,
                query.id.to_string(),
                ProviderKind::Internal.default_confidence(),
                fields_from_entity(&stored.entity),
            ))),
            Err(PipelineError::NotFound(_)) => Ok(None),
            Err(e) => Err(ProviderError::Network {
                provider: SOURCE_NAME.to_string(),
                message: e.to_string(),
            }),
        }
    }
}
