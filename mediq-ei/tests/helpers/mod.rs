//! Test Helper Utilities
//!
//! Shared utilities for testing mediq-ei: in-memory store, mock providers,
//! entity builders and a fully wired operator service.

#![allow(dead_code)]

use async_trait::async_trait;
use mediq_ei::commands::OperatorService;
use mediq_ei::config::{EiConfig, RetryPolicy};
use mediq_ei::error::ProviderError;
use mediq_ei::images::{ImageHit, ImageProvider};
use mediq_ei::pipeline::Pipeline;
use mediq_ei::sources::{EntityQuery, InternalRecordAdapter, SourceAdapter};
use mediq_ei::store::{ContentStore, SqliteContentStore, StoredEntity};
use mediq_ei::types::{
    Contributor, ContributorRole, EntityId, EntityType, FragmentFields, NormalizedEntity,
    ProviderKind, SourceFragment,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Fresh in-memory store
///
/// One connection: every pooled connection to `:memory:` would otherwise see
/// its own empty database.
pub async fn memory_store() -> Arc<SqliteContentStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    Arc::new(SqliteContentStore::new(pool).await.unwrap())
}

/// Defaults with a fast retry policy
pub fn test_config() -> EiConfig {
    let mut config = EiConfig::default();
    config.retry = RetryPolicy {
        attempts: 2,
        timeout_ms: 200,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
    };
    config
}

/// Internal adapter plus `extra`, wired into a service over `store`
pub fn build_service(
    store: Arc<SqliteContentStore>,
    extra: Vec<Arc<dyn SourceAdapter>>,
    image_providers: Vec<Arc<dyn ImageProvider>>,
) -> OperatorService {
    let store: Arc<dyn ContentStore> = store;
    let mut adapters: Vec<Arc<dyn SourceAdapter>> =
        vec![Arc::new(InternalRecordAdapter::new(Arc::clone(&store)))];
    adapters.extend(extra);

    let pipeline = Pipeline::new(Arc::clone(&store), adapters, image_providers, &test_config())
        .unwrap();
    OperatorService::new(store, Arc::new(pipeline))
}

// ============================================================================
// Mock providers
// ============================================================================

/// Source adapter returning fixed fields
pub struct MockAdapter {
    pub name: &'static str,
    pub kind: ProviderKind,
    pub confidence: f64,
    pub fields: FragmentFields,
    pub fail: bool,
    pub calls: AtomicU32,
}

impl MockAdapter {
    pub fn new(name: &'static str, fields: FragmentFields) -> Self {
        Self {
            name,
            kind: ProviderKind::PrimaryMetadata,
            confidence: ProviderKind::PrimaryMetadata.default_confidence(),
            fields,
            fail: false,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            fail: true,
            ..Self::new(name, FragmentFields::default())
        }
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn fetch(&self, query: &EntityQuery) -> Result<Option<SourceFragment>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Network {
                provider: self.name.to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(Some(SourceFragment::new(
            self.name,
            self.kind,
            query.id.to_string(),
            self.confidence,
            self.fields.clone(),
        )))
    }
}

/// Image provider returning fixed URLs and recording every query
pub struct MockImageProvider {
    urls: Vec<String>,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

impl MockImageProvider {
    pub fn new(urls: &[&str]) -> Self {
        Self {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(&[])
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageProvider for MockImageProvider {
    fn name(&self) -> &'static str {
        "mock-stock"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ImageHit>, ProviderError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(ProviderError::Http {
                provider: "mock-stock".to_string(),
                status: 503,
            });
        }
        let total = self.urls.len().min(limit);
        Ok(self
            .urls
            .iter()
            .take(limit)
            .enumerate()
            .map(|(rank, url)| ImageHit {
                url: url.clone(),
                relevance: 1.0 - rank as f64 / total as f64,
                provider: "mock-stock".to_string(),
            })
            .collect())
    }
}

// ============================================================================
// Entity builders
// ============================================================================

/// Post that validates READY
pub fn ready_post(slug: &str) -> NormalizedEntity {
    let mut e = NormalizedEntity::new(EntityId::new(), EntityType::Post, slug);
    e.title_primary = Some("Festival lineup announced".to_string());
    e.title_localized = Some("Công bố danh sách phim liên hoan".to_string());
    e.body_localized =
        Some("Ban tổ chức vừa công bố danh sách phim tranh giải chính thức năm nay.".to_string());
    e.excerpt = Some("This year's competition lineup is out.".to_string());
    e.category = Some("movie-news".to_string());
    e
}

/// Post with a body but a blank localized title (recoverable)
pub fn post_missing_localized_title(slug: &str) -> NormalizedEntity {
    let mut e = ready_post(slug);
    e.title_localized = Some(String::new());
    e
}

/// Post without a category (unrecoverable by default)
pub fn rejected_post(slug: &str) -> NormalizedEntity {
    let mut e = ready_post(slug);
    e.category = None;
    e
}

/// Movie with credits but no external rating
pub fn unrated_movie(slug: &str, director: &str, year: i32, genre: &str) -> NormalizedEntity {
    let mut e = NormalizedEntity::new(EntityId::new(), EntityType::Movie, slug);
    e.title_primary = Some(slug.replace('-', " "));
    e.category = Some("review".to_string());
    e.genres = vec![genre.to_string()];
    e.release_year = Some(year);
    e.contributors = vec![Contributor::new(director, ContributorRole::Director)];
    e
}

pub async fn insert(store: &SqliteContentStore, entity: &NormalizedEntity) -> StoredEntity {
    store.insert(entity).await.unwrap()
}
