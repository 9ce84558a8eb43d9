//! Entity and operator command endpoints
//!
//! | Method | Path | Command |
//! |---|---|---|
//! | GET | `/api/entities` | list (filter + page) |
//! | POST | `/api/entities` | create draft |
//! | GET | `/api/entities/:id` | read |
//! | POST | `/api/entities/:id/validate` | validate |
//! | POST | `/api/entities/:id/regenerate` | regenerate |
//! | GET | `/api/entities/:id/variants` | list variants |
//! | GET | `/api/entities/:id/images` | list images |
//! | POST | `/api/entities/:id/apply` | apply |
//! | POST | `/api/entities/:id/rerun` | rerun |
//! | POST | `/api/entities/:id/score` | editorial score |
//! | POST | `/api/bulk/approve` | bulk approve |
//! | POST | `/api/bulk/delete` | bulk delete |

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::commands::{ApplyOutcome, ApplyRequest, BulkItem, BulkReport};
use crate::normalizer::normalize;
use crate::pipeline::PipelineOutcome;
use crate::sources::internal;
use crate::store::{ListFilter, ListOrder, Page, StoredEntity};
use crate::types::{
    EditorialScoreResult, EntityId, EntityStatus, EntityType, FragmentFields, ImageCandidate,
    ProviderKind, SourceFragment, ValidationResult, Variant,
};
use crate::{ApiError, ApiResult, AppState};

/// Query parameters for GET /api/entities
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub entity_type: Option<String>,
    pub contributor: Option<String>,
    pub published: Option<bool>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

impl ListQuery {
    fn into_filter(self) -> ApiResult<(ListFilter, Page)> {
        let filter = ListFilter {
            status: self
                .status
                .as_deref()
                .map(str::parse::<EntityStatus>)
                .transpose()
                .map_err(ApiError::BadRequest)?,
            category: self.category,
            entity_type: self
                .entity_type
                .as_deref()
                .map(str::parse::<EntityType>)
                .transpose()
                .map_err(ApiError::BadRequest)?,
            primary_contributor: self.contributor,
            release_years: None,
            published: self.published,
            order: ListOrder::Slug,
        };
        let default = Page::default();
        let page = Page::new(
            self.offset.unwrap_or(default.offset),
            self.limit.unwrap_or(default.limit),
        );
        Ok((filter, page))
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub entities: Vec<StoredEntity>,
    pub offset: u32,
    pub limit: u32,
}

/// GET /api/entities
pub async fn list_entities(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListResponse>> {
    let (filter, page) = query.into_filter()?;
    let entities = state.service.store().list(&filter, page).await?;
    Ok(Json(ListResponse {
        entities,
        offset: page.offset,
        limit: page.limit,
    }))
}

/// POST /api/entities
///
/// **Request:** the record's fields (`title_primary`, `category`, ...).
/// The entity starts as a draft; its slug is derived when not given.
pub async fn create_entity(
    State(state): State<AppState>,
    Json(fields): Json<FragmentFields>,
) -> ApiResult<(StatusCode, Json<StoredEntity>)> {
    let id = EntityId::new();
    let fragment = SourceFragment::new(
        internal::SOURCE_NAME,
        ProviderKind::Internal,
        id.to_string(),
        ProviderKind::Internal.default_confidence(),
        fields,
    );
    let entity = normalize(id, vec![fragment])?;
    let stored = state.service.store().insert(&entity).await?;

    info!(entity_id = %id, slug = %stored.entity.slug, "Entity created");
    Ok((StatusCode::CREATED, Json(stored)))
}

/// GET /api/entities/:id
pub async fn get_entity(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> ApiResult<Json<StoredEntity>> {
    Ok(Json(state.service.store().get(id).await?))
}

/// POST /api/entities/:id/validate
pub async fn validate_entity(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> ApiResult<Json<ValidationResult>> {
    Ok(Json(state.service.validate(id).await?))
}

/// POST /api/entities/:id/regenerate
pub async fn regenerate_variants(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> ApiResult<Json<Vec<Variant>>> {
    Ok(Json(state.service.regenerate(id).await?))
}

/// GET /api/entities/:id/variants
pub async fn list_variants(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> ApiResult<Json<Vec<Variant>>> {
    Ok(Json(state.service.list_variants(id).await?))
}

/// GET /api/entities/:id/images
pub async fn list_images(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> ApiResult<Json<Vec<ImageCandidate>>> {
    Ok(Json(state.service.list_images(id).await?))
}

/// POST /api/entities/:id/apply
///
/// **Request:** `{"variant": {...}, "image": {"url": "..."}}`; either may be
/// omitted, not both.
pub async fn apply(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    Json(request): Json<ApplyRequest>,
) -> ApiResult<Json<ApplyOutcome>> {
    Ok(Json(state.service.apply(id, &request).await?))
}

/// POST /api/entities/:id/rerun
pub async fn rerun(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> ApiResult<Json<PipelineOutcome>> {
    Ok(Json(state.service.rerun(id).await?))
}

/// POST /api/entities/:id/score
pub async fn score(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> ApiResult<Json<EditorialScoreResult>> {
    Ok(Json(state.service.score(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub ids: Vec<EntityId>,
}

/// Bulk approve report, `approved` being the published count
#[derive(Debug, Serialize)]
pub struct BulkApproveResponse {
    pub approved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<BulkItem>,
}

impl From<BulkReport> for BulkApproveResponse {
    fn from(report: BulkReport) -> Self {
        Self {
            approved: report.applied,
            skipped: report.skipped,
            failed: report.failed,
            items: report.items,
        }
    }
}

/// Bulk delete report
#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<BulkItem>,
}

impl From<BulkReport> for BulkDeleteResponse {
    fn from(report: BulkReport) -> Self {
        Self {
            deleted: report.applied,
            skipped: report.skipped,
            failed: report.failed,
            items: report.items,
        }
    }
}

/// POST /api/bulk/approve
pub async fn bulk_approve(
    State(state): State<AppState>,
    Json(request): Json<BulkRequest>,
) -> ApiResult<Json<BulkApproveResponse>> {
    if request.ids.is_empty() {
        return Err(ApiError::BadRequest("ids cannot be empty".to_string()));
    }
    let report = state.service.bulk_approve(request.ids).await;
    Ok(Json(report.into()))
}

/// POST /api/bulk/delete
pub async fn bulk_delete(
    State(state): State<AppState>,
    Json(request): Json<BulkRequest>,
) -> ApiResult<Json<BulkDeleteResponse>> {
    if request.ids.is_empty() {
        return Err(ApiError::BadRequest("ids cannot be empty".to_string()));
    }
    let report = state.service.bulk_delete(request.ids).await;
    Ok(Json(report.into()))
}

/// Build entity routes
pub fn entity_routes() -> Router<AppState> {
    Router::new()
        .route("/api/entities", get(list_entities).post(create_entity))
        .route("/api/entities/:id", get(get_entity))
        .route("/api/entities/:id/validate", post(validate_entity))
        .route("/api/entities/:id/regenerate", post(regenerate_variants))
        .route("/api/entities/:id/variants", get(list_variants))
        .route("/api/entities/:id/images", get(list_images))
        .route("/api/entities/:id/apply", post(apply))
        .route("/api/entities/:id/rerun", post(rerun))
        .route("/api/entities/:id/score", post(score))
}

/// Build bulk command routes
pub fn bulk_routes() -> Router<AppState> {
    Router::new()
        .route("/api/bulk/approve", post(bulk_approve))
        .route("/api/bulk/delete", post(bulk_delete))
}
