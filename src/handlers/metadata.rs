//! # Metadata API Handlers
//!
//! This module contains handlers for listing, uploading, and deleting
//! application metadata files (student categories and predicted
//! probabilities) in the object store. Files are grouped by term, with
//! every known term present even when it has no files yet.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::auth::OperatorAuth;
use crate::calendar;
use crate::error::{ApiError, validation_error};
use crate::repositories::TermRepository;
use crate::server::AppState;
use crate::storage::{self, StorageError};

/// Request payload for the metadata upload endpoint. Field names
/// follow the admin UI's camelCase payloads.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetadataUploadRequest {
    /// Target file name, e.g. "2021-spring-pred-proba.csv"
    pub new_file_name: String,
    /// CSV file content
    pub content: String,
}

/// Request payload for the metadata delete endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MetadataDeleteRequest {
    /// File name to delete, e.g. "2021-spring-pred-proba.csv"
    pub file_name: String,
}

/// List metadata files grouped by term
#[utoipa::path(
    post,
    path = "/api/internal/metadata/",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Metadata files grouped by term", body = serde_json::Value, example = json!({
            "metadata_files": {
                "2021-winter": {},
                "2021-spring": {
                    "student_categories": {"file_name": "2021-spring-netid-name-stunum-categories.csv"},
                    "predicted_probabilites": {"file_name": "2021-spring-pred-proba.csv"}
                }
            }
        })),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "metadata"
)]
pub async fn list_metadata(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<serde_json::Value>, ApiError> {
    let terms = TermRepository::new(state.db.clone()).all().await?;
    let files = state
        .store
        .list("application_metadata", "")
        .await
        .map_err(map_storage_error)?;

    let mut grouped: Vec<(String, serde_json::Map<String, serde_json::Value>)> = terms
        .into_iter()
        .filter_map(|term| term.sis_term_id)
        .map(|sis_term_id| (sis_term_id, serde_json::Map::new()))
        .collect();

    for path in &files {
        let Some(file_name) = path.rsplit('/').next() else {
            continue;
        };
        let Some((sis_term_id, upload_type)) = parse_metadata_file_name(file_name) else {
            tracing::warn!(path, "skipping unrecognized metadata file");
            continue;
        };
        let idx = match grouped.iter().position(|(term, _)| *term == sis_term_id) {
            Some(idx) => idx,
            None => {
                grouped.push((sis_term_id, serde_json::Map::new()));
                grouped.len() - 1
            }
        };
        grouped[idx]
            .1
            .insert(upload_type.to_string(), json!({"file_name": file_name}));
    }

    // Chronological term order, not lexical: 2020-autumn before
    // 2021-winter before 2021-spring.
    grouped.sort_by_key(|(sis_term_id, _)| {
        calendar::sortable_term_id(sis_term_id).unwrap_or_else(|_| sis_term_id.clone())
    });

    let mut metadata_files = serde_json::Map::new();
    for (sis_term_id, entry) in grouped {
        metadata_files.insert(sis_term_id, serde_json::Value::Object(entry));
    }

    Ok(Json(json!({"metadata_files": metadata_files})))
}

/// Upload a metadata file
#[utoipa::path(
    post,
    path = "/api/internal/metadata/upload/",
    security(("bearer_auth" = [])),
    request_body = MetadataUploadRequest,
    responses(
        (status = 200, description = "File stored", body = serde_json::Value, example = json!({"uploaded": true})),
        (status = 400, description = "Unrecognized file name", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "metadata"
)]
pub async fn upload_metadata(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<MetadataUploadRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let path = storage::metadata_upload_path(&request.new_file_name).map_err(map_storage_error)?;
    state
        .store
        .upload(&path, request.content.as_bytes())
        .await
        .map_err(map_storage_error)?;
    tracing::info!(path, "uploaded metadata file");
    Ok(Json(json!({"uploaded": true})))
}

/// Delete a metadata file
#[utoipa::path(
    post,
    path = "/api/internal/metadata/delete/",
    security(("bearer_auth" = [])),
    request_body = MetadataDeleteRequest,
    responses(
        (status = 200, description = "File deleted", body = serde_json::Value, example = json!({"deleted": true})),
        (status = 400, description = "Unrecognized file name", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "File does not exist", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "metadata"
)]
pub async fn delete_metadata(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<MetadataDeleteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let path = storage::metadata_upload_path(&request.file_name).map_err(map_storage_error)?;
    state.store.delete(&path).await.map_err(map_storage_error)?;
    tracing::info!(path, "deleted metadata file");
    Ok(Json(json!({"deleted": true})))
}

/// Splits a metadata file name into its term and upload type, based on
/// the naming convention alone.
fn parse_metadata_file_name(file_name: &str) -> Option<(String, &'static str)> {
    if let Some(sis_term_id) = file_name.strip_suffix("-netid-name-stunum-categories.csv") {
        return Some((sis_term_id.to_string(), "student_categories"));
    }
    if let Some(sis_term_id) = file_name.strip_suffix("-pred-proba.csv") {
        return Some((sis_term_id.to_string(), "predicted_probabilites"));
    }
    None
}

fn map_storage_error(err: StorageError) -> ApiError {
    match err {
        StorageError::NotFound { path } => ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("No such file: {}", path),
        ),
        StorageError::InvalidPath { .. } | StorageError::UnknownMetadataFile { .. } => {
            validation_error(
                "Invalid file name",
                json!({"file_name": err.to_string()}),
            )
        }
        other => {
            tracing::error!(error = %other, "object store operation failed");
            crate::error::ErrorType::InternalServerError.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, StorageConfig};
    use crate::db::init_pool;
    use crate::server::{AppState, create_app};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use migration::MigratorTrait;
    use sea_orm::{ActiveModelTrait, Set};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn setup_test_app() -> (axum::Router, tempfile::TempDir) {
        let store_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = AppConfig {
            profile: "test".to_string(),
            database_url: "sqlite::memory:".to_string(),
            operator_tokens: vec!["test-token-123".to_string()],
            storage: StorageConfig {
                backend: "fs".to_string(),
                fs_root: store_dir.path().to_string_lossy().into_owned(),
                ..StorageConfig::default()
            },
            ..Default::default()
        };

        let db = init_pool(&config).await.expect("Failed to init test DB");
        migration::Migrator::up(&db, None)
            .await
            .expect("Failed to apply migrations");

        for (sis_term_id, year, quarter) in
            [("2021-winter", 2021, "winter"), ("2021-spring", 2021, "spring")]
        {
            crate::models::term::ActiveModel {
                sis_term_id: Set(Some(sis_term_id.to_string())),
                year: Set(Some(year)),
                quarter: Set(Some(quarter.to_string())),
                ..Default::default()
            }
            .insert(&db)
            .await
            .expect("Failed to seed term");
        }

        let state = AppState::for_tests_with_db(Arc::new(config), db);
        (create_app(state), store_dir)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, "Bearer test-token-123")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn response_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn file_names_parse_into_term_and_type() {
        assert_eq!(
            parse_metadata_file_name("2021-spring-netid-name-stunum-categories.csv"),
            Some(("2021-spring".to_string(), "student_categories"))
        );
        assert_eq!(
            parse_metadata_file_name("2021-spring-pred-proba.csv"),
            Some(("2021-spring".to_string(), "predicted_probabilites"))
        );
        assert_eq!(parse_metadata_file_name("notes.txt"), None);
    }

    #[tokio::test]
    async fn list_seeds_all_terms() {
        let (app, _store_dir) = setup_test_app().await;

        let response = app
            .oneshot(post_json("/api/internal/metadata/", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_json(response).await;
        let files = body["metadata_files"].as_object().unwrap();
        assert!(files.contains_key("2021-winter"));
        assert!(files.contains_key("2021-spring"));
        assert!(files["2021-spring"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_then_list_then_delete() {
        let (app, _store_dir) = setup_test_app().await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/internal/metadata/upload/",
                json!({
                    "newFileName": "2021-spring-pred-proba.csv",
                    "content": "system_key,pred0\n123,0.5\n"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await["uploaded"], true);

        let response = app
            .clone()
            .oneshot(post_json("/api/internal/metadata/", json!({})))
            .await
            .unwrap();
        let body = response_json(response).await;
        assert_eq!(
            body["metadata_files"]["2021-spring"]["predicted_probabilites"]["file_name"],
            "2021-spring-pred-proba.csv"
        );

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/internal/metadata/delete/",
                json!({"file_name": "2021-spring-pred-proba.csv"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await["deleted"], true);

        let response = app
            .oneshot(post_json("/api/internal/metadata/", json!({})))
            .await
            .unwrap();
        let body = response_json(response).await;
        assert!(
            body["metadata_files"]["2021-spring"]
                .as_object()
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn upload_rejects_unknown_file_names() {
        let (app, _store_dir) = setup_test_app().await;

        let response = app
            .oneshot(post_json(
                "/api/internal/metadata/upload/",
                json!({"newFileName": "mystery.csv", "content": "a,b\n"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_missing_file_returns_404() {
        let (app, _store_dir) = setup_test_app().await;

        let response = app
            .oneshot(post_json(
                "/api/internal/metadata/delete/",
                json!({"file_name": "2021-spring-pred-proba.csv"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
