//! # Server Configuration
//!
//! This module contains the server setup and configuration for the
//! RAD aggregator admin API.

use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::handlers;
use crate::storage::ObjectStore;
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub store: ObjectStore,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        config: Arc<AppConfig>,
    ) -> Result<Self, crate::storage::StorageError> {
        let store = ObjectStore::from_config(&config.storage)?;
        Ok(Self { db, config, store })
    }

    #[cfg(test)]
    pub fn for_tests(config: Arc<AppConfig>) -> Self {
        Self::for_tests_with_db(config, DatabaseConnection::default())
    }

    #[cfg(test)]
    pub fn for_tests_with_db(config: Arc<AppConfig>, db: DatabaseConnection) -> Self {
        let store = ObjectStore::from_config(&config.storage).expect("test store config");
        Self { db, config, store }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let internal = Router::new()
        .route("/api/internal/jobs/", post(handlers::jobs::list_jobs))
        .route(
            "/api/internal/jobs-chart-data/",
            post(handlers::jobs::jobs_chart_data),
        )
        .route(
            "/api/internal/jobs/restart/",
            post(handlers::jobs::restart_jobs),
        )
        .route(
            "/api/internal/jobs/clear/",
            post(handlers::jobs::clear_jobs),
        )
        .route(
            "/api/internal/metadata/",
            post(handlers::metadata::list_metadata),
        )
        .route(
            "/api/internal/metadata/upload/",
            post(handlers::metadata::upload_metadata),
        )
        .route(
            "/api/internal/metadata/delete/",
            post(handlers::metadata::delete_metadata),
        )
        .layer(from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(internal)
        .layer(from_fn(telemetry::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: Arc<AppConfig>,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let state = AppState::new(db, config)?;
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "admin API listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::jobs::list_jobs,
        crate::handlers::jobs::jobs_chart_data,
        crate::handlers::jobs::restart_jobs,
        crate::handlers::jobs::clear_jobs,
        crate::handlers::metadata::list_metadata,
        crate::handlers::metadata::upload_metadata,
        crate::handlers::metadata::delete_metadata,
    ),
    components(
        schemas(
            crate::handlers::types::ServiceInfo,
            crate::handlers::jobs::JobFilterRequest,
            crate::handlers::jobs::DateRange,
            crate::handlers::jobs::JobInfo,
            crate::handlers::jobs::JobsResponse,
            crate::handlers::jobs::JobIdsRequest,
            crate::handlers::metadata::MetadataUploadRequest,
            crate::handlers::metadata::MetadataDeleteRequest,
            crate::error::ApiError,
        )
    ),
    info(
        title = "RAD Aggregator Admin API",
        description = "Internal API for managing analytics collection jobs and application metadata",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
