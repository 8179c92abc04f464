//! Basic integration tests for the admin API HTTP surface.

mod test_utils;

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::Client;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use rad_aggregator::config::AppConfig;
use rad_aggregator::server::{AppState, create_app};

use test_utils::setup_test_db;

/// Starts the app on a random port over a migrated in-memory database.
async fn start_test_server() -> String {
    let db = setup_test_db().await.unwrap();
    let config = AppConfig {
        profile: "test".to_string(),
        database_url: "sqlite::memory:".to_string(),
        operator_tokens: vec!["test-token-123".to_string()],
        ..Default::default()
    };
    let state = AppState::new(db, Arc::new(config)).unwrap();
    let app = create_app(state);

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn root_endpoint_reports_service_info() {
    let base = start_test_server().await;
    let response = Client::new().get(&base).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["service"], "rad-aggregator");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn health_endpoint_checks_the_database() {
    let base = start_test_server().await;
    let response = Client::new()
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn internal_routes_require_bearer_auth() {
    let base = start_test_server().await;
    let client = Client::new();

    let response = client
        .post(format!("{}/api/internal/jobs/", base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = client
        .post(format!("{}/api/internal/jobs/", base))
        .bearer_auth("wrong-token")
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn job_listing_round_trips_over_http() {
    let base = start_test_server().await;
    let response = Client::new()
        .post(format!("{}/api/internal/jobs/", base))
        .bearer_auth("test-token-123")
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["total_jobs"], 0);
    assert!(body["jobs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn openapi_document_is_served() {
    let base = start_test_server().await;
    let response = Client::new()
        .get(format!("{}/openapi.json", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert!(body["paths"]["/api/internal/jobs/"].is_object());
}
