//! HTTP routing tests for the operator endpoints

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use helpers::*;
use http_body_util::BodyExt;
use mediq_ei::store::SqliteContentStore;
use mediq_ei::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn test_app() -> (Router, Arc<SqliteContentStore>) {
    let store = memory_store().await;
    let service = build_service(Arc::clone(&store), Vec::new(), Vec::new());
    (build_router(AppState::new(Arc::new(service))), store)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _store) = test_app().await;

    let (status, json) = send(app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "mediq-ei");
    assert!(json["uptime_seconds"].is_u64());
    assert_eq!(json["datastore"], "ok");
    assert_eq!(json["sources"], json!(["internal"]));
}

#[tokio::test]
async fn test_create_then_get_entity() {
    let (app, _store) = test_app().await;

    let (status, created) = send(
        app.clone(),
        post_json(
            "/api/entities",
            json!({
                "title_primary": "Festival Lineup Announced",
                "category": "movie-news"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["version"], 1);
    assert_eq!(created["entity"]["slug"], "festival-lineup-announced");
    assert_eq!(created["entity"]["status"], "DRAFT");

    let id = created["entity"]["id"].as_str().unwrap().to_string();
    let (status, fetched) = send(app, get(&format!("/api/entities/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["entity"]["title_primary"], "Festival Lineup Announced");
}

#[tokio::test]
async fn test_unknown_entity_is_404() {
    let (app, _store) = test_app().await;
    let id = uuid::Uuid::new_v4();

    let (status, json) = send(app, get(&format!("/api/entities/{id}"))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_validate_endpoint_reports_issues() {
    let (app, store) = test_app().await;
    let stored = insert(&store, &post_missing_localized_title("validate-http")).await;

    let (status, json) = send(
        app,
        post_json(&format!("/api/entities/{}/validate", stored.id()), json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "NEEDS_REVIEW");
    let issues = json["issues"].as_array().unwrap();
    assert!(issues
        .iter()
        .any(|i| i["code"] == "empty_localized_title" && i["severity"] == "blocking"));
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let (app, store) = test_app().await;
    let ready = insert(&store, &ready_post("list-ready")).await;
    insert(&store, &rejected_post("list-rejected")).await;

    let (status, _) = send(
        app.clone(),
        post_json(&format!("/api/entities/{}/validate", ready.id()), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(app.clone(), get("/api/entities?status=ready")).await;
    assert_eq!(status, StatusCode::OK);
    let entities = json["entities"].as_array().unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0]["entity"]["slug"], "list-ready");

    let (status, _) = send(app, get("/api/entities?status=published")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bulk_approve_response_shape() {
    let (app, store) = test_app().await;
    let mut ids = Vec::new();
    for i in 0..2 {
        ids.push(insert(&store, &ready_post(&format!("bulk-ready-{i}"))).await.id());
    }
    for i in 0..3 {
        ids.push(insert(&store, &rejected_post(&format!("bulk-rejected-{i}"))).await.id());
    }

    let (status, json) = send(app, post_json("/api/bulk/approve", json!({ "ids": ids }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["approved"], 2);
    assert_eq!(json["skipped"], 3);
    assert_eq!(json["failed"], 0);
    assert_eq!(json["items"][0]["outcome"], "applied");
    assert_eq!(json["items"][4]["outcome"], "skipped");
    assert_eq!(json["items"][4]["reason"], "status is REJECTED");
}

#[tokio::test]
async fn test_bulk_with_no_ids_is_400() {
    let (app, _store) = test_app().await;

    let (status, _) = send(
        app.clone(),
        post_json("/api/bulk/approve", json!({ "ids": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app, post_json("/api/bulk/delete", json!({ "ids": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_apply_without_choice_is_400() {
    let (app, store) = test_app().await;
    let stored = insert(&store, &ready_post("apply-empty")).await;

    let (status, json) = send(
        app,
        post_json(&format!("/api/entities/{}/apply", stored.id()), json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_rerun_returns_outcome() {
    let (app, store) = test_app().await;
    let stored = insert(&store, &ready_post("rerun-http")).await;

    let (status, json) = send(
        app,
        post_json(&format!("/api/entities/{}/rerun", stored.id()), json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["validation"]["status"], "READY");
    assert_eq!(json["fragments_fetched"], 1);
    assert_eq!(json["entity"]["image_source"], "placeholder");
}
