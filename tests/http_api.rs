use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use knowledge_refinery::api::{create_router, AppState};
use knowledge_refinery::config::Config;
use knowledge_refinery::db::{Database, VectorStore};
use knowledge_refinery::llm::LmStudioClient;

async fn test_state() -> (TempDir, AppState) {
    let workspace = tempfile::tempdir().expect("failed to create workspace dir");

    let mut config = Config::from_env();
    config.set_data_dir(workspace.path().to_path_buf());
    // Nothing listens here; LLM-dependent paths degrade.
    config.lm_studio.base_url = "http://127.0.0.1:9/v1".to_string();
    config.lm_studio.timeout_secs = 2;
    let config = Arc::new(config);

    let db = Database::new(&config.db_path)
        .await
        .expect("failed to create database");
    let vectors = Arc::new(VectorStore::new(db.clone(), 768));
    vectors.load_all().await.expect("failed to load vectors");
    let lm = Arc::new(LmStudioClient::new(
        &config.lm_studio.base_url,
        config.lm_studio.timeout_secs,
    ));

    (workspace, AppState::new(config, db, vectors, lm))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

#[tokio::test]
async fn health_reports_daemon_state() {
    let (_workspace, state) = test_state().await;
    let app = create_router(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["db"], json!("connected"));
    assert_eq!(body["lm_studio"], json!("unavailable"));
    assert_eq!(body["vector_count"], json!(0));
    assert_eq!(body["watched_volumes"], json!([]));
    assert_eq!(body["context_length"], Value::Null);
}

#[tokio::test]
async fn volumes_add_list_remove_round_trip() {
    let (_workspace, state) = test_state().await;
    let app = create_router(state);
    let watched = tempfile::tempdir().unwrap();
    let watched_path = watched.path().to_string_lossy().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/volumes/add")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"path": watched_path, "label": "corpus"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["label"], json!("corpus"));
    assert!(body["id"].as_str().unwrap().len() == 16);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/volumes/list")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!(
                    "/volumes/remove?path={}",
                    urlencode(&watched_path)
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("removed"));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/volumes/list")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn volumes_add_rejects_non_directory() {
    let (_workspace, state) = test_state().await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/volumes/add")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"path": "/definitely/not/a/real/dir"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_on_empty_cache_returns_empty_list() {
    let (_workspace, state) = test_state().await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/search")
                .header("content-type", "application/json")
                .body(Body::from(json!({"query": "anything", "limit": 5}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn quick_search_requires_query_param() {
    let (_workspace, state) = test_state().await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/search/quick")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_asset_and_concept_return_404() {
    let (_workspace, state) = test_state().await;
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/evidence/deadbeefdeadbeefdeadbeefdeadbeef")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/concepts/deadbeefdeadbeefdeadbeefdeadbeef")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/evidence/chunk/deadbeefdeadbeefdeadbeefdeadbeef/annotation")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn concepts_list_is_empty_initially() {
    let (_workspace, state) = test_state().await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/concepts/list")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn ingest_status_reflects_idle_daemon() {
    let (_workspace, state) = test_state().await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/ingest/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["running"], json!(false));
    assert_eq!(body["total_assets"], json!(0));
    assert_eq!(body["chunk_count"], json!(0));
    assert_eq!(body["live"], json!({}));
    assert_eq!(body["activity_log"], json!([]));
}

#[tokio::test]
async fn universe_snapshot_is_empty_before_ingest() {
    let (_workspace, state) = test_state().await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/universe/snapshot?lod=macro")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["lod"], json!("macro"));
    assert_eq!(body["node_count"], json!(0));
    assert_eq!(body["edge_count"], json!(0));
}

/// Percent-encode a path for use in a query string.
fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                (b as char).to_string()
            }
            other => format!("%{other:02X}"),
        })
        .collect()
}
