//! Source Adapters
//!
//! Each adapter fetches raw attributes for one entity from one provider and
//! returns a provider-tagged [`SourceFragment`]. Adapters never merge; that is
//! the Normalizer's job.
//!
//! # Adapters
//! 1. **internal** - the stored record itself
//! 2. **metadata_client** - primary metadata provider (title/year search, details with credits)
//! 3. **stock_client** - stock image search, consumed by Image Intelligence
//!
//! # Parallel Execution
//! [`SourceFetcher`] runs all adapters concurrently. Every call is wrapped in
//! timeout + bounded retry; a provider that still fails contributes no
//! fragment and never blocks the others.

pub mod internal;
pub mod metadata_client;
pub mod stock_client;

pub use internal::InternalRecordAdapter;
pub use metadata_client::MetadataProviderClient;
pub use stock_client::StockImageClient;

use crate::config::RetryPolicy;
use crate::error::ProviderError;
use crate::types::{EntityId, EntityType, NormalizedEntity, ProviderKind, SourceFragment};
use crate::utils::{degrade, with_retry};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// What adapters know about the entity being looked up
#[derive(Debug, Clone, PartialEq)]
pub struct EntityQuery {
    pub id: EntityId,
    pub entity_type: EntityType,
    pub title: Option<String>,
    pub year: Option<i32>,
    /// Provider name → id at that provider
    pub external_ids: BTreeMap<String, String>,
}

impl EntityQuery {
    pub fn for_entity(entity: &NormalizedEntity) -> Self {
        Self {
            id: entity.id,
            entity_type: entity.entity_type,
            title: entity.display_title().map(str::to_string),
            year: entity.release_year,
            external_ids: entity.external_ids.clone(),
        }
    }
}

/// One provider of raw entity attributes
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Provider name recorded in `SourceFragment::source`
    fn name(&self) -> &'static str;

    /// Merge priority class
    fn kind(&self) -> ProviderKind;

    /// Fetch this provider's view of the entity
    ///
    /// `Ok(None)` means the provider has nothing for this entity.
    async fn fetch(&self, query: &EntityQuery) -> Result<Option<SourceFragment>, ProviderError>;
}

/// Runs every adapter concurrently and collects their fragments
pub struct SourceFetcher {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    retry: RetryPolicy,
}

impl SourceFetcher {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, retry: RetryPolicy) -> Self {
        Self { adapters, retry }
    }

    /// Fetch from all adapters
    ///
    /// Fragments come back in adapter order. Failed adapters are logged and
    /// skipped.
    pub async fn fetch_all(&self, query: &EntityQuery) -> Vec<SourceFragment> {
        let calls = self.adapters.iter().map(|adapter| async move {
            let name = adapter.name();
            let result = with_retry(name, &self.retry, || adapter.fetch(query)).await;
            let fragment = degrade(name, result).flatten();
            debug!(
                adapter = name,
                entity_id = %query.id,
                found = fragment.is_some(),
                "Source adapter finished"
            );
            fragment
        });

        join_all(calls).await.into_iter().flatten().collect()
    }

    /// Adapter names in merge-input order
    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockAdapter;
    use super::*;
    use crate::types::FragmentFields;
    use std::sync::atomic::Ordering;

    fn query() -> EntityQuery {
        EntityQuery {
            id: EntityId::new(),
            entity_type: EntityType::Movie,
            title: Some("Heat".to_string()),
            year: Some(1995),
            external_ids: BTreeMap::new(),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 2,
            timeout_ms: 100,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_failed_adapter_is_isolated() {
        let good = Arc::new(MockAdapter::new(
            "internal",
            ProviderKind::Internal,
            FragmentFields {
                title_primary: Some("Heat".to_string()),
                ..Default::default()
            },
        ));
        let bad = Arc::new(MockAdapter::failing("flaky"));

        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![good.clone(), bad.clone()];
        let fetcher = SourceFetcher::new(adapters, fast_retry());
        let fragments = fetcher.fetch_all(&query()).await;

        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].source, "internal");
        // Retried up to the policy limit
        assert_eq!(bad.calls.load(Ordering::SeqCst), 2);
        assert_eq!(good.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fragments_keep_adapter_order() {
        let a = Arc::new(MockAdapter::new("a", ProviderKind::Internal, FragmentFields::default()));
        let b = Arc::new(MockAdapter::new("b", ProviderKind::Secondary, FragmentFields::default()));

        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![a, b];
        let fetcher = SourceFetcher::new(adapters, fast_retry());
        let names: Vec<String> = fetcher
            .fetch_all(&query())
            .await
            .into_iter()
            .map(|f| f.source)
            .collect();

        assert_eq!(names, vec!["a", "b"]);
    }
}
