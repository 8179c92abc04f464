//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the
//! internal admin API.

pub mod jobs;
pub mod metadata;
pub mod types;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;

use crate::server::AppState;
use types::ServiceInfo;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness probe backed by a trivial database query
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Database is unreachable")
    ),
    tag = "root"
)]
pub async fn health(State(state): State<AppState>) -> StatusCode {
    match crate::db::health_check(&state.db).await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            tracing::error!(error = %err, "health check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn root_reports_service_name_and_version() {
        let Json(info) = root().await;
        assert_eq!(info.service, "rad-aggregator");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }
}
