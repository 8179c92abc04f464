//! # Jobs API Handlers
//!
//! This module contains handlers for the admin job listing, the status
//! chart, and the restart/clear operator actions. Status filtering and
//! sorting happen in code because status is derived, not stored.

use std::cmp::Ordering;
use std::str::FromStr;

use axum::{extract::State, http::StatusCode, response::Json};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, validation_error};
use crate::repositories::{JobError, JobRepository, JobStatus, JobWithStatus};
use crate::server::AppState;

/// Filters accepted by the job listing endpoint. Field names follow
/// the admin UI's camelCase payloads.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobFilterRequest {
    /// Keep jobs whose target window overlaps this range
    pub active_date_range: Option<DateRange>,
    /// Keep jobs whose run window overlaps this range
    pub job_date_range: Option<DateRange>,
    /// Job type names to include (e.g. ["assignment"])
    pub job_type: Option<Vec<String>>,
    /// Derived status values to include (e.g. ["failed"])
    pub job_status: Option<Vec<String>>,
    /// Field to sort by
    pub sort_by: Option<String>,
    /// Sort descending when true
    #[serde(default)]
    pub sort_desc: bool,
    /// 1-based page number
    pub curr_page: Option<u64>,
    /// Page size
    pub per_page: Option<u64>,
}

/// An inclusive date range filter
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    #[schema(example = "2021-04-01")]
    pub start_date: Option<String>,
    #[schema(example = "2021-04-07")]
    pub end_date: Option<String>,
}

/// Job information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    /// Job row id
    pub id: i32,
    /// Collector context (canvas_course_id, sis_term_id, week)
    pub context: serde_json::Value,
    /// Job type discriminator
    #[schema(example = "assignment")]
    pub job_type: String,
    /// Claiming worker's process id, null while pending
    pub pid: Option<i32>,
    /// Execution start timestamp
    pub start: Option<String>,
    /// Execution end timestamp
    pub end: Option<String>,
    /// Captured failure message, empty when healthy
    pub message: String,
    /// Creation timestamp
    pub created: Option<String>,
    /// Derived lifecycle status
    #[schema(example = "completed")]
    pub status: String,
    /// Selection flag for the admin UI, always false server-side
    pub selected: bool,
}

/// Response payload for the job listing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobsResponse {
    /// Jobs on the requested page
    pub jobs: Vec<JobInfo>,
    /// Total matching jobs before pagination
    pub total_jobs: u64,
}

/// Request payload for the restart and clear endpoints
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobIdsRequest {
    /// Job row ids to act on
    pub job_ids: Vec<i32>,
}

impl From<JobWithStatus> for JobInfo {
    fn from(item: JobWithStatus) -> Self {
        Self {
            id: item.job.id,
            context: item.job.context,
            job_type: item.job_type,
            pid: item.job.pid,
            start: item.job.start.map(|dt| dt.to_rfc3339()),
            end: item.job.end.map(|dt| dt.to_rfc3339()),
            message: item.job.message,
            created: Some(item.job.created.to_rfc3339()),
            status: item.status.to_string(),
            selected: false,
        }
    }
}

/// List jobs with derived status, filtered, sorted, and paginated
#[utoipa::path(
    post,
    path = "/api/internal/jobs/",
    security(("bearer_auth" = [])),
    request_body = JobFilterRequest,
    responses(
        (status = 200, description = "Jobs matching the filters", body = JobsResponse, example = json!({
            "jobs": [
                {
                    "id": 17,
                    "context": {"canvas_course_id": 1234, "sis_term_id": "2021-spring", "week": 3},
                    "job_type": "assignment",
                    "pid": 4821,
                    "start": "2021-04-20T06:00:01+00:00",
                    "end": "2021-04-20T06:02:30+00:00",
                    "message": "",
                    "created": "2021-04-20T05:00:00+00:00",
                    "status": "completed",
                    "selected": false
                }
            ],
            "total_jobs": 1
        })),
        (status = 400, description = "Invalid filters", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(filters): Json<JobFilterRequest>,
) -> Result<Json<JobsResponse>, ApiError> {
    let per_page = filters.per_page.unwrap_or(50);
    if per_page == 0 {
        return Err(validation_error(
            "Invalid perPage",
            json!({"perPage": "Minimum allowed page size is 1"}),
        ));
    }
    let curr_page = filters.curr_page.unwrap_or(1);
    if curr_page == 0 {
        return Err(validation_error(
            "Invalid currPage",
            json!({"currPage": "Pages are numbered from 1"}),
        ));
    }

    let active_range = parse_date_range(filters.active_date_range.as_ref(), "activeDateRange")?;
    let job_range = parse_date_range(filters.job_date_range.as_ref(), "jobDateRange")?;

    let status_filter = match &filters.job_status {
        Some(values) => {
            let mut statuses = Vec::with_capacity(values.len());
            for value in values {
                let status = JobStatus::from_str(value).map_err(|_| {
                    validation_error(
                        "Invalid jobStatus",
                        json!({"jobStatus": format!(
                            "Unknown status '{}'. Must be one of: pending, claimed, running, \
                             completed, failed, expired",
                            value
                        )}),
                    )
                })?;
                statuses.push(status);
            }
            Some(statuses)
        }
        None => None,
    };

    if let Some(sort_by) = &filters.sort_by
        && !SORTABLE_FIELDS.contains(&sort_by.as_str())
    {
        return Err(validation_error(
            "Invalid sortBy",
            json!({"sortBy": format!(
                "Unknown field '{}'. Must be one of: {}",
                sort_by,
                SORTABLE_FIELDS.join(", ")
            )}),
        ));
    }

    let repo = JobRepository::new(state.db.clone());
    let mut jobs = repo
        .list_with_status(Utc::now())
        .await
        .map_err(map_job_error)?;

    if let Some((range_start, range_end)) = active_range {
        jobs.retain(|item| {
            range_end.is_none_or(|end| item.job.target_date_start <= end)
                && range_start.is_none_or(|start| item.job.target_date_end >= start)
        });
    }
    // Jobs that have not run yet stay visible under a run-window filter.
    if let Some((range_start, range_end)) = job_range {
        jobs.retain(|item| {
            range_end.is_none_or(|end| item.job.start.is_none_or(|start| start <= end))
                && range_start
                    .is_none_or(|start| item.job.end.is_none_or(|end| end >= start))
        });
    }
    if let Some(job_types) = &filters.job_type {
        jobs.retain(|item| job_types.iter().any(|jt| *jt == item.job_type));
    }
    if let Some(statuses) = &status_filter {
        jobs.retain(|item| statuses.contains(&item.status));
    }

    let total_jobs = jobs.len() as u64;
    let mut job_infos: Vec<JobInfo> = jobs.into_iter().map(JobInfo::from).collect();

    if let Some(sort_by) = &filters.sort_by {
        job_infos.sort_by(|a, b| compare_jobs(a, b, sort_by));
        if filters.sort_desc {
            job_infos.reverse();
        }
    }

    let page_start = ((curr_page - 1) * per_page) as usize;
    let page_end = (curr_page * per_page) as usize;
    let page = if page_start >= job_infos.len() {
        Vec::new()
    } else {
        job_infos
            .drain(page_start..page_end.min(job_infos.len()))
            .collect()
    };

    Ok(Json(JobsResponse {
        jobs: page,
        total_jobs,
    }))
}

/// Count of jobs per derived status
#[utoipa::path(
    post,
    path = "/api/internal/jobs-chart-data/",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Job counts keyed by status", body = serde_json::Value, example = json!({
            "pending": 12, "claimed": 0, "running": 3,
            "completed": 1204, "failed": 2, "expired": 40
        })),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn jobs_chart_data(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<serde_json::Value>, ApiError> {
    let repo = JobRepository::new(state.db.clone());
    let counts = repo
        .status_counts(Utc::now())
        .await
        .map_err(map_job_error)?;

    let mut chart = serde_json::Map::new();
    for (status, count) in counts {
        chart.insert(status.to_string(), json!(count));
    }
    Ok(Json(serde_json::Value::Object(chart)))
}

/// Reset jobs to pending with a fresh claim window
#[utoipa::path(
    post,
    path = "/api/internal/jobs/restart/",
    security(("bearer_auth" = [])),
    request_body = JobIdsRequest,
    responses(
        (status = 200, description = "Jobs reset to pending", body = serde_json::Value, example = json!({"reset": true})),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "A job id does not exist", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn restart_jobs(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<JobIdsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let repo = JobRepository::new(state.db.clone());
    let count = repo
        .restart_jobs(&request.job_ids)
        .await
        .map_err(map_job_error)?;
    tracing::info!(count, "restarted jobs");
    Ok(Json(json!({"reset": true})))
}

/// Clear claim state and captured messages from jobs
#[utoipa::path(
    post,
    path = "/api/internal/jobs/clear/",
    security(("bearer_auth" = [])),
    request_body = JobIdsRequest,
    responses(
        (status = 200, description = "Job state cleared", body = serde_json::Value, example = json!({"cleared": true})),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "A job id does not exist", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn clear_jobs(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<JobIdsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let repo = JobRepository::new(state.db.clone());
    let count = repo
        .clear_jobs(&request.job_ids)
        .await
        .map_err(map_job_error)?;
    tracing::info!(count, "cleared jobs");
    Ok(Json(json!({"cleared": true})))
}

const SORTABLE_FIELDS: [&str; 8] = [
    "id", "job_type", "pid", "start", "end", "message", "created", "status",
];

fn compare_jobs(a: &JobInfo, b: &JobInfo, field: &str) -> Ordering {
    match field {
        "id" => a.id.cmp(&b.id),
        "job_type" => a.job_type.cmp(&b.job_type),
        "pid" => a.pid.unwrap_or(0).cmp(&b.pid.unwrap_or(0)),
        "start" => a.start.cmp(&b.start),
        "end" => a.end.cmp(&b.end),
        "message" => a.message.cmp(&b.message),
        "created" => a.created.cmp(&b.created),
        "status" => a.status.cmp(&b.status),
        _ => Ordering::Equal,
    }
}

type ParsedRange = Option<(Option<DateTime<FixedOffset>>, Option<DateTime<FixedOffset>>)>;

/// Parses a date range filter. Accepts RFC 3339 timestamps or plain
/// dates; a plain end date extends to the end of that day.
fn parse_date_range(range: Option<&DateRange>, field: &str) -> Result<ParsedRange, ApiError> {
    let Some(range) = range else {
        return Ok(None);
    };
    let start = range
        .start_date
        .as_deref()
        .map(|value| parse_filter_date(value, field, false))
        .transpose()?;
    let end = range
        .end_date
        .as_deref()
        .map(|value| parse_filter_date(value, field, true))
        .transpose()?;
    if start.is_none() && end.is_none() {
        return Ok(None);
    }
    Ok(Some((start, end)))
}

fn parse_filter_date(
    value: &str,
    field: &str,
    end_of_day: bool,
) -> Result<DateTime<FixedOffset>, ApiError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let time = if end_of_day {
            date.and_hms_opt(23, 59, 59)
        } else {
            date.and_hms_opt(0, 0, 0)
        };
        if let Some(naive) = time {
            return Ok(naive.and_utc().fixed_offset());
        }
    }
    Err(validation_error(
        "Invalid date filter",
        json!({field: format!(
            "Could not parse '{}'. Use an RFC 3339 timestamp or YYYY-MM-DD",
            value
        )}),
    ))
}

fn map_job_error(err: JobError) -> ApiError {
    match err {
        JobError::NotFound { id } => ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("Job {} not found", id),
        ),
        JobError::InvalidTransition { id, reason } => ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            &format!("Job {}: {}", id, reason),
        ),
        JobError::Db(db_err) => db_err.into(),
        JobError::UnknownStatus { value } => {
            tracing::error!(value, "derived an unrepresentable job status");
            crate::error::ErrorType::InternalServerError.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::init_pool;
    use crate::repositories::JobTypeRepository;
    use crate::server::{AppState, create_app};
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
    };
    use chrono::Duration;
    use migration::MigratorTrait;
    use sea_orm::DatabaseConnection;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn setup_test_app() -> (Router, DatabaseConnection) {
        let config = AppConfig {
            profile: "test".to_string(),
            database_url: "sqlite::memory:".to_string(),
            operator_tokens: vec!["test-token-123".to_string()],
            ..Default::default()
        };

        let db = init_pool(&config).await.expect("Failed to init test DB");
        migration::Migrator::up(&db, None)
            .await
            .expect("Failed to apply migrations");

        let state = AppState::for_tests_with_db(Arc::new(config), db.clone());
        (create_app(state), db)
    }

    async fn seed_job(
        db: &DatabaseConnection,
        job_type: &str,
        start_offset_hours: i64,
        end_offset_hours: i64,
    ) -> i32 {
        let types = JobTypeRepository::new(db.clone());
        let jt = types.get_or_create(job_type).await.unwrap();
        let now = Utc::now();
        let repo = JobRepository::new(db.clone());
        let (job, _) = repo
            .create_job(
                jt.id,
                json!({"canvas_course_id": 1234, "sis_term_id": "2021-spring", "week": 1}),
                now + Duration::hours(start_offset_hours),
                now + Duration::hours(end_offset_hours),
            )
            .await
            .unwrap();
        job.id
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

    #[tokio::test]
    async fn list_jobs_requires_auth() {
        let (app, _db) = setup_test_app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/internal/jobs/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn list_jobs_returns_pending_job() {
        let (app, db) = setup_test_app().await;
        seed_job(&db, "assignment", -1, 24).await;

        let response = app
            .oneshot(post_json(
                "/api/internal/jobs/",
                json!({"currPage": 1, "perPage": 10}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_json(response).await;
        assert_eq!(body["total_jobs"], 1);
        let job = &body["jobs"][0];
        assert_eq!(job["job_type"], "assignment");
        assert_eq!(job["status"], "pending");
        assert_eq!(job["pid"], serde_json::Value::Null);
        assert_eq!(job["selected"], false);
        assert_eq!(job["context"]["sis_term_id"], "2021-spring");
    }

    #[tokio::test]
    async fn list_jobs_filters_by_status() {
        let (app, db) = setup_test_app().await;
        seed_job(&db, "assignment", -1, 24).await;
        // An already-closed window derives as expired.
        seed_job(&db, "participation", -48, -24).await;

        let response = app
            .oneshot(post_json(
                "/api/internal/jobs/",
                json!({"jobStatus": ["expired"], "currPage": 1, "perPage": 10}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_json(response).await;
        assert_eq!(body["total_jobs"], 1);
        assert_eq!(body["jobs"][0]["job_type"], "participation");
        assert_eq!(body["jobs"][0]["status"], "expired");
    }

    #[tokio::test]
    async fn list_jobs_filters_by_job_type() {
        let (app, db) = setup_test_app().await;
        seed_job(&db, "assignment", -1, 24).await;
        seed_job(&db, "participation", -1, 24).await;

        let response = app
            .oneshot(post_json(
                "/api/internal/jobs/",
                json!({"jobType": ["assignment"], "currPage": 1, "perPage": 10}),
            ))
            .await
            .unwrap();
        let body = response_json(response).await;
        assert_eq!(body["total_jobs"], 1);
        assert_eq!(body["jobs"][0]["job_type"], "assignment");
    }

    #[tokio::test]
    async fn list_jobs_paginates() {
        let (app, db) = setup_test_app().await;
        for hour in 0..5 {
            seed_job(&db, "assignment", -1 - hour, 24 + hour).await;
        }

        let response = app
            .oneshot(post_json(
                "/api/internal/jobs/",
                json!({"currPage": 2, "perPage": 2, "sortBy": "id"}),
            ))
            .await
            .unwrap();
        let body = response_json(response).await;
        assert_eq!(body["total_jobs"], 5);
        assert_eq!(body["jobs"].as_array().unwrap().len(), 2);
        assert_eq!(body["jobs"][0]["id"], 3);
        assert_eq!(body["jobs"][1]["id"], 4);
    }

    #[tokio::test]
    async fn list_jobs_rejects_unknown_status() {
        let (app, _db) = setup_test_app().await;
        let response = app
            .oneshot(post_json(
                "/api/internal/jobs/",
                json!({"jobStatus": ["exploded"], "currPage": 1, "perPage": 10}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chart_data_covers_all_statuses() {
        let (app, db) = setup_test_app().await;
        seed_job(&db, "assignment", -1, 24).await;

        let response = app
            .oneshot(post_json("/api/internal/jobs-chart-data/", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_json(response).await;
        for status in ["pending", "claimed", "running", "completed", "failed", "expired"] {
            assert!(body.get(status).is_some(), "missing status {}", status);
        }
        assert_eq!(body["pending"], 1);
        assert_eq!(body["failed"], 0);
    }

    #[tokio::test]
    async fn restart_resets_failed_job_to_pending() {
        let (app, db) = setup_test_app().await;
        let job_id = seed_job(&db, "assignment", -1, 24).await;

        let repo = JobRepository::new(db.clone());
        repo.fail_job(job_id, "boom").await.unwrap();

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/internal/jobs/restart/",
                json!({"job_ids": [job_id]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["reset"], true);

        let job = repo.find_by_id(job_id).await.unwrap();
        assert_eq!(job.pid, None);
        assert_eq!(job.message, "");
        assert_eq!(JobStatus::derive(&job, Utc::now()), JobStatus::Pending);
    }

    #[tokio::test]
    async fn restart_unknown_job_returns_404() {
        let (app, _db) = setup_test_app().await;
        let response = app
            .oneshot(post_json(
                "/api/internal/jobs/restart/",
                json!({"job_ids": [99999]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn clear_returns_cleared() {
        let (app, db) = setup_test_app().await;
        let job_id = seed_job(&db, "assignment", -1, 24).await;

        let response = app
            .oneshot(post_json(
                "/api/internal/jobs/clear/",
                json!({"job_ids": [job_id]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["cleared"], true);
    }
}
