//! End-to-end pipeline scenarios over an in-memory store
//!
//! Drives the operator service the way the admin layer does: validate,
//! regenerate, apply, rerun, score and the bulk commands.

mod helpers;

use helpers::*;
use mediq_ei::commands::{ApplyRequest, BulkOutcome, ImageChoice};
use mediq_ei::error::PipelineError;
use mediq_ei::images::ImageProvider;
use mediq_ei::sources::SourceAdapter;
use mediq_ei::store::ContentStore;
use mediq_ei::types::{
    EntityId, EntityStatus, FragmentFields, ImageSource, IssueCode, Severity,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

// ============================================================================
// Scenario A: empty localized title never validates READY
// ============================================================================

#[tokio::test]
async fn test_empty_localized_title_blocks_ready() {
    let store = memory_store().await;
    let service = build_service(Arc::clone(&store), Vec::new(), Vec::new());
    let stored = insert(&store, &post_missing_localized_title("lineup-missing-localized")).await;

    let validation = service.validate(stored.id()).await.unwrap();

    assert_ne!(validation.status, EntityStatus::Ready);
    assert!(matches!(
        validation.status,
        EntityStatus::NeedsReview | EntityStatus::Rejected
    ));
    let issue = validation
        .issues
        .iter()
        .find(|i| i.code == IssueCode::EmptyLocalizedTitle)
        .expect("empty localized title issue");
    assert_eq!(issue.field, "title_localized");
    assert_eq!(issue.severity, Severity::Blocking);

    // Status is persisted alongside the issues
    let reread = store.get(stored.id()).await.unwrap();
    assert_eq!(reread.entity.status, validation.status);
    assert_eq!(reread.entity.validation.as_ref(), Some(&validation));
}

#[tokio::test]
async fn test_regenerate_and_apply_fixes_localized_title() {
    let store = memory_store().await;
    let service = build_service(Arc::clone(&store), Vec::new(), Vec::new());
    let stored = insert(&store, &post_missing_localized_title("lineup-fixable")).await;

    let variants = service.regenerate(stored.id()).await.unwrap();
    assert!(!variants.is_empty());
    assert_eq!(service.list_variants(stored.id()).await.unwrap(), variants);

    let chosen = variants
        .iter()
        .find(|v| v.title_localized.is_some())
        .expect("variant with a localized title")
        .clone();
    let request = ApplyRequest {
        variant: Some(chosen.clone()),
        image: None,
    };
    let outcome = service.apply(stored.id(), &request).await.unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.entity.entity.title_localized, chosen.title_localized);
    assert_eq!(outcome.entity.entity.status, EntityStatus::Ready);
    assert_eq!(outcome.entity.version, stored.version + 1);

    // The applied value is attributed to the template, and that survives a reload
    let reloaded = store.get(stored.id()).await.unwrap();
    let provenance = reloaded.entity.provenance("title_localized").unwrap();
    assert_eq!(provenance.source, format!("variant:{}", chosen.template_id));
    assert_eq!(provenance.confidence, 1.0);

    // Applying clears the working set
    assert!(service.list_variants(stored.id()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_regenerate_on_ready_entity_returns_nothing() {
    let store = memory_store().await;
    let service = build_service(Arc::clone(&store), Vec::new(), Vec::new());
    let stored = insert(&store, &ready_post("lineup-ready")).await;

    assert!(service.regenerate(stored.id()).await.unwrap().is_empty());
}

// ============================================================================
// Scenario B: sensitive content forces abstract imagery
// ============================================================================

#[tokio::test]
async fn test_sensitive_entity_selects_abstract_image() {
    let store = memory_store().await;
    let provider = Arc::new(MockImageProvider::new(&[
        "https://stock.test/a.jpg",
        "https://stock.test/b.jpg",
    ]));
    let providers: Vec<Arc<dyn ImageProvider>> = vec![provider.clone()];
    let service = build_service(Arc::clone(&store), Vec::new(), providers);

    let mut entity = ready_post("stunt-accident");
    entity.title_primary = Some("Stunt accident halts filming".to_string());
    let stored = insert(&store, &entity).await;

    let outcome = service.rerun(stored.id()).await.unwrap();

    assert_eq!(outcome.entity.image_source, Some(ImageSource::Abstract));
    assert!(outcome
        .entity
        .image_candidates
        .iter()
        .filter(|c| c.source != ImageSource::Placeholder)
        .all(|c| c.source == ImageSource::Abstract));

    // Nothing about the event itself ever reaches the stock provider
    let queries = provider.queries();
    assert!(!queries.is_empty());
    for query in &queries {
        let lower = query.to_lowercase();
        assert!(!lower.contains("accident"), "leaked query: {query}");
        assert!(!lower.contains("stunt"), "leaked query: {query}");
    }
}

#[tokio::test]
async fn test_sensitive_entity_falls_back_to_pattern_when_provider_down() {
    let store = memory_store().await;
    let providers: Vec<Arc<dyn ImageProvider>> = vec![Arc::new(MockImageProvider::failing())];
    let service = build_service(Arc::clone(&store), Vec::new(), providers);

    let mut entity = ready_post("crash-report");
    entity.body_localized = Some(
        "A crash on the highway delayed the festival opening by several hours.".to_string(),
    );
    let stored = insert(&store, &entity).await;

    let outcome = service.rerun(stored.id()).await.unwrap();

    assert_eq!(outcome.entity.image_source, Some(ImageSource::Abstract));
    let url = outcome.entity.image_url.unwrap();
    assert!(url.contains("/pattern/"), "unexpected url: {url}");
}

// ============================================================================
// Scenario C: comparable entities drive the editorial score
// ============================================================================

#[tokio::test]
async fn test_editorial_score_uses_stored_comparables() {
    let store = memory_store().await;
    let service = build_service(Arc::clone(&store), Vec::new(), Vec::new());

    for (slug, year, rating) in [
        ("cyclo", 1995, 7.0),
        ("the-scent-of-green-papaya", 1993, 7.2),
        ("vertical-ray-of-the-sun", 1996, 7.4),
    ] {
        let mut movie = unrated_movie(slug, "Tran Anh Hung", year, "Drama");
        movie.external_rating = Some(rating);
        insert(&store, &movie).await;
    }
    // Different director, ignored
    let mut other = unrated_movie("other-film", "Someone Else", 1994, "Drama");
    other.external_rating = Some(2.0);
    insert(&store, &other).await;

    let subject = insert(
        &store,
        &unrated_movie("untitled-drama", "tran anh hung", 1998, "Drama"),
    )
    .await;

    let result = service.score(subject.id()).await.unwrap();

    assert_eq!(result.breakdown.comparable, 7.2);
    assert_eq!(result.breakdown.genre_era, 7.1);
    assert_eq!(result.score, 7.1);
    assert_eq!(result.confidence, 0.67);
    assert!(!result.needs_review);

    // Snapshot persisted for later comparable lookups
    let reread = store.get(subject.id()).await.unwrap();
    assert_eq!(reread.editorial, Some(result));
}

#[tokio::test]
async fn test_editorial_score_without_comparables_needs_review() {
    let store = memory_store().await;
    let service = build_service(Arc::clone(&store), Vec::new(), Vec::new());
    let subject = insert(&store, &unrated_movie("lone-film", "Nobody", 2031, "Western")).await;

    let result = service.score(subject.id()).await.unwrap();

    assert_eq!(result.confidence, 0.0);
    assert!(result.needs_review);
    assert_eq!(result.breakdown.comparable, result.breakdown.genre_era);
}

// ============================================================================
// Scenario D: bulk approve filters per item
// ============================================================================

#[tokio::test]
async fn test_bulk_approve_reports_applied_and_skipped() {
    let store = memory_store().await;
    let service = build_service(Arc::clone(&store), Vec::new(), Vec::new());

    let mut ids = Vec::new();
    for i in 0..2 {
        ids.push(insert(&store, &ready_post(&format!("ready-{i}"))).await.id());
    }
    for i in 0..3 {
        ids.push(insert(&store, &rejected_post(&format!("rejected-{i}"))).await.id());
    }

    let report = service.bulk_approve(ids.clone()).await;

    assert_eq!(report.applied, 2);
    assert_eq!(report.skipped, 3);
    assert_eq!(report.failed, 0);
    // Per-item results keep input order
    let item_ids: Vec<EntityId> = report.items.iter().map(|i| i.id).collect();
    assert_eq!(item_ids, ids);
    for item in &report.items[2..] {
        assert_eq!(
            item.outcome,
            BulkOutcome::Skipped("status is REJECTED".to_string())
        );
    }

    for id in &ids[..2] {
        let stored = store.get(*id).await.unwrap();
        assert!(stored.published);
        assert_eq!(stored.entity.status, EntityStatus::Ready);
    }
    for id in &ids[2..] {
        assert!(!store.get(*id).await.unwrap().published);
    }
}

#[tokio::test]
async fn test_bulk_approve_skips_published_and_fails_missing() {
    let store = memory_store().await;
    let service = build_service(Arc::clone(&store), Vec::new(), Vec::new());
    let stored = insert(&store, &ready_post("already-out")).await;

    let first = service.bulk_approve(vec![stored.id()]).await;
    assert_eq!(first.applied, 1);

    let second = service.bulk_approve(vec![stored.id(), EntityId::new()]).await;
    assert_eq!(second.applied, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.failed, 1);
    assert_eq!(
        second.items[0].outcome,
        BulkOutcome::Skipped("already published".to_string())
    );
}

#[tokio::test]
async fn test_bulk_delete_skips_published() {
    let store = memory_store().await;
    let service = build_service(Arc::clone(&store), Vec::new(), Vec::new());
    let published = insert(&store, &ready_post("published-post")).await;
    let draft = insert(&store, &rejected_post("draft-post")).await;
    service.bulk_approve(vec![published.id()]).await;

    let report = service.bulk_delete(vec![published.id(), draft.id()]).await;

    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped, 1);
    assert!(store.get(published.id()).await.is_ok());
    assert!(matches!(
        store.get(draft.id()).await,
        Err(PipelineError::NotFound(_))
    ));
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_validate_is_deterministic_and_status_stable() {
    let store = memory_store().await;
    let service = build_service(Arc::clone(&store), Vec::new(), Vec::new());
    let stored = insert(&store, &post_missing_localized_title("stable-status")).await;

    let first = service.validate(stored.id()).await.unwrap();
    let after_first = store.get(stored.id()).await.unwrap();
    let second = service.validate(stored.id()).await.unwrap();
    let after_second = store.get(stored.id()).await.unwrap();

    assert_eq!(first, second);
    // Unchanged fields: no second write
    assert_eq!(after_first.version, after_second.version);
    assert_eq!(after_first.entity.status, after_second.entity.status);
}

#[tokio::test]
async fn test_apply_is_idempotent() {
    let store = memory_store().await;
    let service = build_service(Arc::clone(&store), Vec::new(), Vec::new());
    let stored = insert(&store, &post_missing_localized_title("idempotent-apply")).await;

    let variants = service.regenerate(stored.id()).await.unwrap();
    let request = ApplyRequest {
        variant: variants.first().cloned(),
        image: Some(ImageChoice {
            url: "https://img.test/chosen.jpg".to_string(),
            source: None,
        }),
    };

    let once = service.apply(stored.id(), &request).await.unwrap();
    let twice = service.apply(stored.id(), &request).await.unwrap();

    assert!(once.changed);
    assert!(!twice.changed);
    assert_eq!(once.entity, twice.entity);
    assert_eq!(twice.entity.entity.image_source, Some(ImageSource::Manual));
}

#[tokio::test]
async fn test_apply_listed_image_keeps_candidate_source() {
    let store = memory_store().await;
    let service = build_service(Arc::clone(&store), Vec::new(), Vec::new());
    let stored = insert(&store, &ready_post("image-choice")).await;

    let candidates = service.list_images(stored.id()).await.unwrap();
    let choice = candidates.first().expect("placeholder floor").clone();
    assert_eq!(choice.source, ImageSource::Placeholder);

    let request = ApplyRequest {
        variant: None,
        image: Some(ImageChoice {
            url: choice.url.clone(),
            source: None,
        }),
    };
    let outcome = service.apply(stored.id(), &request).await.unwrap();

    assert_eq!(outcome.entity.entity.image_url, Some(choice.url));
    assert_eq!(outcome.entity.entity.image_source, Some(ImageSource::Placeholder));
    assert_eq!(
        outcome.entity.entity.provenance("image_url").unwrap().source,
        "operator"
    );
}

#[tokio::test]
async fn test_working_state_dropped_when_entity_disappears() {
    let store = memory_store().await;
    let service = build_service(Arc::clone(&store), Vec::new(), Vec::new());
    let stored = insert(&store, &ready_post("deleted-elsewhere")).await;

    service.list_images(stored.id()).await.unwrap();
    assert_eq!(service.working_set().len().await, 1);

    // Removed without going through bulk delete
    store.delete(stored.id(), stored.version).await.unwrap();

    assert!(matches!(
        service.list_variants(stored.id()).await,
        Err(PipelineError::NotFound(_))
    ));
    assert!(service.working_set().is_empty().await);
}

#[tokio::test]
async fn test_apply_without_choice_is_invalid() {
    let store = memory_store().await;
    let service = build_service(Arc::clone(&store), Vec::new(), Vec::new());
    let stored = insert(&store, &ready_post("empty-apply")).await;

    let request = ApplyRequest {
        variant: None,
        image: None,
    };
    assert!(matches!(
        service.apply(stored.id(), &request).await,
        Err(PipelineError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_rerun_keeps_merged_away_values_in_sources() {
    let store = memory_store().await;
    let adapter = Arc::new(MockAdapter::new(
        "mock-meta",
        FragmentFields {
            title_primary: Some("Festival Lineup (Provider Title)".to_string()),
            popularity: Some(1234.0),
            ..FragmentFields::default()
        },
    ));
    let extra: Vec<Arc<dyn SourceAdapter>> = vec![adapter.clone()];
    let service = build_service(Arc::clone(&store), extra, Vec::new());
    let stored = insert(&store, &ready_post("merge-sources")).await;

    let outcome = service.rerun(stored.id()).await.unwrap();

    assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.fragments_fetched, 2);
    // Internal record wins the title, provider fills popularity
    assert_eq!(
        outcome.entity.title_primary.as_deref(),
        Some("Festival lineup announced")
    );
    assert_eq!(outcome.entity.popularity, Some(1234.0));
    let provider_fragment = outcome
        .entity
        .sources
        .iter()
        .find(|f| f.source == "mock-meta")
        .expect("provider fragment kept");
    assert_eq!(
        provider_fragment.fields.title_primary.as_deref(),
        Some("Festival Lineup (Provider Title)")
    );

    let reread = store.get(stored.id()).await.unwrap();
    assert!(reread.entity.sources.iter().any(|f| f.source == "mock-meta"));
}

#[tokio::test]
async fn test_rerun_carries_forward_when_provider_fails() {
    let store = memory_store().await;
    let stored = insert(&store, &ready_post("carry-forward")).await;

    let healthy: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(MockAdapter::new(
        "mock-meta",
        FragmentFields {
            popularity: Some(42.0),
            ..FragmentFields::default()
        },
    ))];
    build_service(Arc::clone(&store), healthy, Vec::new())
        .rerun(stored.id())
        .await
        .unwrap();

    let failing = Arc::new(MockAdapter::failing("mock-meta"));
    let extra: Vec<Arc<dyn SourceAdapter>> = vec![failing.clone()];
    let outcome = build_service(Arc::clone(&store), extra, Vec::new())
        .rerun(stored.id())
        .await
        .unwrap();

    // Retried, then degraded to "no result"
    assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.fragments_fetched, 1);
    assert_eq!(outcome.fragments_carried, 1);
    assert_eq!(outcome.entity.popularity, Some(42.0));
}

#[tokio::test]
async fn test_rerun_unknown_entity_is_not_found() {
    let store = memory_store().await;
    let service = build_service(Arc::clone(&store), Vec::new(), Vec::new());

    let result = service.rerun(EntityId::new()).await;
    assert!(matches!(result, Err(PipelineError::NotFound(_))));
}

#[tokio::test]
async fn test_image_fallback_always_selects_something() {
    let store = memory_store().await;
    let providers: Vec<Arc<dyn ImageProvider>> = vec![Arc::new(MockImageProvider::failing())];
    let service = build_service(Arc::clone(&store), Vec::new(), providers);
    let stored = insert(&store, &ready_post("no-images-anywhere")).await;

    let outcome = service.rerun(stored.id()).await.unwrap();

    assert_eq!(outcome.entity.image_source, Some(ImageSource::Placeholder));
    assert!(outcome.entity.image_url.is_some());
    assert_eq!(outcome.entity.status, EntityStatus::Ready);
}

#[tokio::test]
async fn test_image_selection_is_deterministic() {
    let store = memory_store().await;
    let providers: Vec<Arc<dyn ImageProvider>> = vec![Arc::new(MockImageProvider::new(&[
        "https://stock.test/1.jpg",
        "https://stock.test/2.jpg",
    ]))];
    let service = build_service(Arc::clone(&store), Vec::new(), providers);
    let stored = insert(&store, &ready_post("repeatable-images")).await;

    let first = service.pipeline().select_images(&stored.entity).await;
    let second = service.pipeline().select_images(&stored.entity).await;

    assert_eq!(first, second);
}
