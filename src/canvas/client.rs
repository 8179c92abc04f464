//! Canvas REST client.
//!
//! Covers the endpoints the collectors and the subaccount activity
//! report need: course enrollments, per-student assignment analytics,
//! course participation summaries, account analytics, and provisioning
//! reports (create, poll, download, delete).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::cache::{CacheDecision, cache_decision};
use super::{GatewayError, RetryPolicy, send_with_retry};

const SERVICE: &str = "canvas";
const REPORT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const REPORT_POLL_MAX: u32 = 120;

/// A course as returned by `GET /api/v1/courses/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CanvasCourse {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub sis_course_id: Option<String>,
    #[serde(default)]
    pub account_id: Option<i64>,
    #[serde(default)]
    pub sis_account_id: Option<String>,
    #[serde(default)]
    pub enrollment_term_id: Option<i64>,
    #[serde(default)]
    pub workflow_state: Option<String>,
}

/// An account or subaccount.
#[derive(Debug, Clone, Deserialize)]
pub struct CanvasAccount {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub sis_account_id: Option<String>,
}

/// An enrollment term.
#[derive(Debug, Clone, Deserialize)]
pub struct CanvasTerm {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sis_term_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Enrollment {
    user_id: i64,
}

/// Submission sub-object of the assignment analytics payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionAnalytics {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

/// One row of `GET /api/v1/courses/{c}/analytics/users/{u}/assignments`.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentAnalytics {
    pub assignment_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub unlock_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub points_possible: Option<f64>,
    #[serde(default)]
    pub non_digital_submission: Option<bool>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub muted: Option<bool>,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub first_quartile: Option<i32>,
    #[serde(default)]
    pub median: Option<i32>,
    #[serde(default)]
    pub third_quartile: Option<i32>,
    #[serde(default)]
    pub excused: Option<bool>,
    #[serde(default)]
    pub submission: Option<SubmissionAnalytics>,
    /// Stamped after fetch; not part of the payload.
    #[serde(skip)]
    pub canvas_user_id: i64,
    #[serde(skip)]
    pub canvas_course_id: i64,
}

/// Tardiness breakdown of the participation summary. Canvas reports
/// these as floats.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TardinessBreakdown {
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub on_time: Option<f64>,
    #[serde(default)]
    pub late: Option<f64>,
    #[serde(default)]
    pub missing: Option<f64>,
    #[serde(default)]
    pub floating: Option<f64>,
}

/// One row of `GET /api/v1/courses/{c}/analytics/student_summaries`.
#[derive(Debug, Clone, Deserialize)]
pub struct ParticipationAnalytics {
    /// Canvas user id (`id` in the payload).
    #[serde(rename = "id")]
    pub canvas_user_id: i64,
    #[serde(default)]
    pub page_views: Option<i64>,
    #[serde(default)]
    pub max_page_views: Option<i64>,
    #[serde(default)]
    pub page_views_level: Option<i64>,
    #[serde(default)]
    pub participations: Option<i64>,
    #[serde(default)]
    pub max_participations: Option<i64>,
    #[serde(default)]
    pub participations_level: Option<i64>,
    #[serde(default)]
    pub tardiness_breakdown: Option<TardinessBreakdown>,
    #[serde(skip)]
    pub canvas_course_id: i64,
}

/// Account activity summary, split by view category.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountActivity {
    #[serde(default)]
    pub by_category: Vec<CategoryViews>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryViews {
    pub category: String,
    #[serde(default)]
    pub views: Option<i64>,
}

/// A provisioning report job.
#[derive(Debug, Clone, Deserialize)]
pub struct CanvasReport {
    pub id: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub attachment: Option<ReportAttachment>,
    #[serde(skip)]
    account_id: String,
    #[serde(skip)]
    report_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportAttachment {
    pub url: String,
}

/// A cached collection page: body plus the next-page link that came
/// with it.
#[derive(Debug, Clone)]
struct CachedPage {
    body: Vec<u8>,
    next: Option<String>,
}

/// Client for the Canvas REST API. Cloning shares the page cache.
#[derive(Debug, Clone)]
pub struct CanvasClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    per_page: u32,
    page_cache: Arc<Mutex<HashMap<String, CachedPage>>>,
}

impl CanvasClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GatewayError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            per_page: 100,
            page_cache: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_one<T: serde::de::DeserializeOwned>(
        &self,
        policy: &RetryPolicy,
        url: &str,
    ) -> Result<T, GatewayError> {
        let response = send_with_retry(policy, SERVICE, url, || {
            self.http.get(url).bearer_auth(&self.token)
        })
        .await?;
        let bytes = response.bytes().await.map_err(GatewayError::Http)?;
        serde_json::from_slice(&bytes).map_err(GatewayError::Decode)
    }

    fn cached_page(&self, url: &str) -> Option<CachedPage> {
        self.page_cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(url).cloned())
    }

    /// Fetches one collection page, serving cacheable analytics pages
    /// from the in-process cache. Weekly analytics snapshots never
    /// change once written, so a reclaimed job re-reads them for free.
    async fn get_page(
        &self,
        policy: &RetryPolicy,
        url: &str,
    ) -> Result<CachedPage, GatewayError> {
        if let Some(hit) = self.cached_page(url) {
            tracing::debug!(url, "gateway cache hit");
            return Ok(hit);
        }
        let response = send_with_retry(policy, SERVICE, url, || {
            self.http.get(url).bearer_auth(&self.token)
        })
        .await?;
        let status = response.status().as_u16();
        let next = next_link(&response);
        let body = response.bytes().await.map_err(GatewayError::Http)?.to_vec();
        let page = CachedPage { body, next };

        let path = url::Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        if cache_decision(SERVICE, &path, status) == CacheDecision::CacheForever {
            if let Ok(mut cache) = self.page_cache.lock() {
                cache.insert(url.to_string(), page.clone());
            }
        }
        Ok(page)
    }

    /// Fetches all pages of a collection endpoint, following the
    /// `Link: rel="next"` headers Canvas emits.
    async fn get_all<T: serde::de::DeserializeOwned>(
        &self,
        policy: &RetryPolicy,
        first_url: String,
    ) -> Result<Vec<T>, GatewayError> {
        let mut url = first_url;
        let mut out = Vec::new();
        loop {
            let page = self.get_page(policy, &url).await?;
            let mut rows: Vec<T> =
                serde_json::from_slice(&page.body).map_err(GatewayError::Decode)?;
            out.append(&mut rows);
            match page.next {
                Some(n) => url = n,
                None => break,
            }
        }
        Ok(out)
    }

    /// Fetches a course by canvas id.
    pub async fn get_course(&self, canvas_course_id: i64) -> Result<CanvasCourse, GatewayError> {
        let url = self.url(&format!("/api/v1/courses/{}", canvas_course_id));
        self.get_one(&RetryPolicy::analytics(), &url).await
    }

    /// Lists the distinct canvas user ids of the students enrolled in a
    /// course, including inactive and deleted enrollments so late drops
    /// keep their history.
    pub async fn list_student_ids(
        &self,
        canvas_course_id: i64,
    ) -> Result<Vec<i64>, GatewayError> {
        let url = self.url(&format!(
            "/api/v1/courses/{}/enrollments?type[]=StudentEnrollment\
             &state[]=active&state[]=deleted&state[]=inactive&per_page={}",
            canvas_course_id, self.per_page
        ));
        let enrollments: Vec<Enrollment> =
            self.get_all(&RetryPolicy::analytics(), url).await?;
        let mut seen = HashSet::new();
        Ok(enrollments
            .into_iter()
            .map(|e| e.user_id)
            .filter(|id| seen.insert(*id))
            .collect())
    }

    /// Fetches one student's assignment analytics for a course.
    pub async fn get_student_assignment_analytics(
        &self,
        canvas_course_id: i64,
        canvas_user_id: i64,
    ) -> Result<Vec<AssignmentAnalytics>, GatewayError> {
        let url = self.url(&format!(
            "/api/v1/courses/{}/analytics/users/{}/assignments?per_page={}",
            canvas_course_id, canvas_user_id, self.per_page
        ));
        self.get_all(&RetryPolicy::analytics(), url).await
    }

    /// Collects assignment analytics for every student in a course,
    /// stamping canvas ids onto each row. Students the analytics API no
    /// longer knows (404) are skipped with a warning.
    pub async fn collect_assignment_analytics(
        &self,
        canvas_course_id: i64,
    ) -> Result<Vec<AssignmentAnalytics>, GatewayError> {
        let students = self.list_student_ids(canvas_course_id).await?;
        let mut rows = Vec::new();
        for canvas_user_id in students {
            match self
                .get_student_assignment_analytics(canvas_course_id, canvas_user_id)
                .await
            {
                Ok(mut analytics) => {
                    for row in &mut analytics {
                        row.canvas_user_id = canvas_user_id;
                        row.canvas_course_id = canvas_course_id;
                    }
                    rows.append(&mut analytics);
                }
                Err(err) if err.status() == Some(404) => {
                    tracing::warn!(
                        canvas_course_id,
                        canvas_user_id,
                        "no assignment analytics for student, skipping"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(rows)
    }

    /// Collects the per-student participation summaries for a course.
    pub async fn collect_participation_analytics(
        &self,
        canvas_course_id: i64,
    ) -> Result<Vec<ParticipationAnalytics>, GatewayError> {
        let url = self.url(&format!(
            "/api/v1/courses/{}/analytics/student_summaries?per_page={}",
            canvas_course_id, self.per_page
        ));
        let mut rows: Vec<ParticipationAnalytics> =
            self.get_all(&RetryPolicy::analytics(), url).await?;
        for row in &mut rows {
            row.canvas_course_id = canvas_course_id;
        }
        Ok(rows)
    }

    /// Fetches an account by id segment (numeric or `sis_account_id:`-prefixed).
    pub async fn get_account(&self, account: &str) -> Result<CanvasAccount, GatewayError> {
        let url = self.url(&format!("/api/v1/accounts/{}", account));
        self.get_one(&RetryPolicy::reports(), &url).await
    }

    /// Lists every subaccount below an account, recursively.
    pub async fn list_sub_accounts(
        &self,
        account: &str,
    ) -> Result<Vec<CanvasAccount>, GatewayError> {
        let url = self.url(&format!(
            "/api/v1/accounts/{}/sub_accounts?recursive=true&per_page={}",
            account, self.per_page
        ));
        self.get_all(&RetryPolicy::reports(), url).await
    }

    /// Fetches the enrollment term a sis term id maps to.
    pub async fn get_enrollment_term(
        &self,
        account: &str,
        sis_term_id: &str,
    ) -> Result<CanvasTerm, GatewayError> {
        let url = self.url(&format!(
            "/api/v1/accounts/{}/terms/sis_term_id:{}",
            account, sis_term_id
        ));
        self.get_one(&RetryPolicy::reports(), &url).await
    }

    /// Per-term account statistics (courses, teachers, students, ...).
    pub async fn get_account_statistics(
        &self,
        sis_account_id: &str,
        sis_term_id: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, GatewayError> {
        let url = self.url(&format!(
            "/api/v1/accounts/sis_account_id:{}/analytics/terms/sis_term_id:{}/statistics",
            sis_account_id, sis_term_id
        ));
        self.get_one(&RetryPolicy::reports(), &url).await
    }

    /// Per-term account page-view activity, split by category.
    pub async fn get_account_activity(
        &self,
        sis_account_id: &str,
        sis_term_id: &str,
    ) -> Result<AccountActivity, GatewayError> {
        let url = self.url(&format!(
            "/api/v1/accounts/sis_account_id:{}/analytics/terms/sis_term_id:{}/activity",
            sis_account_id, sis_term_id
        ));
        self.get_one(&RetryPolicy::reports(), &url).await
    }

    /// Starts a report on an account. `params` are form-encoded Canvas
    /// report parameters, e.g. `parameters[courses]=true`.
    pub async fn create_report(
        &self,
        account: &str,
        report_type: &str,
        params: &[(&str, &str)],
    ) -> Result<CanvasReport, GatewayError> {
        let url = self.url(&format!(
            "/api/v1/accounts/{}/reports/{}",
            account, report_type
        ));
        let policy = RetryPolicy::reports();
        let response = send_with_retry(&policy, SERVICE, &url, || {
            self.http.post(&url).bearer_auth(&self.token).form(params)
        })
        .await?;
        let bytes = response.bytes().await.map_err(GatewayError::Http)?;
        let mut report: CanvasReport =
            serde_json::from_slice(&bytes).map_err(GatewayError::Decode)?;
        report.account_id = account.to_string();
        report.report_type = report_type.to_string();
        Ok(report)
    }

    /// Polls a report until it completes, then downloads its CSV body.
    pub async fn get_report_data(&self, report: &CanvasReport) -> Result<String, GatewayError> {
        let status_url = self.url(&format!(
            "/api/v1/accounts/{}/reports/{}/{}",
            report.account_id, report.report_type, report.id
        ));
        let policy = RetryPolicy::reports();

        let mut polls = 0u32;
        let attachment = loop {
            let mut current: CanvasReport = self.get_one(&policy, &status_url).await?;
            match current.status.as_deref() {
                Some("complete") => match current.attachment.take() {
                    Some(attachment) => break attachment,
                    None => {
                        return Err(GatewayError::ReportMissingAttachment {
                            report_id: report.id,
                        });
                    }
                },
                Some("error") | Some("deleted") | Some("aborted") => {
                    return Err(GatewayError::ReportFailed {
                        report_id: report.id,
                        state: current.status.unwrap_or_default(),
                    });
                }
                _ => {
                    polls += 1;
                    if polls >= REPORT_POLL_MAX {
                        return Err(GatewayError::ReportFailed {
                            report_id: report.id,
                            state: "timed out waiting for completion".to_string(),
                        });
                    }
                    tokio::time::sleep(REPORT_POLL_INTERVAL).await;
                }
            }
        };

        let response = send_with_retry(&policy, SERVICE, &attachment.url, || {
            self.http.get(&attachment.url).bearer_auth(&self.token)
        })
        .await?;
        response.text().await.map_err(GatewayError::Http)
    }

    /// Deletes a finished report from the account.
    pub async fn delete_report(&self, report: &CanvasReport) -> Result<(), GatewayError> {
        let url = self.url(&format!(
            "/api/v1/accounts/{}/reports/{}/{}",
            report.account_id, report.report_type, report.id
        ));
        send_with_retry(&RetryPolicy::reports(), SERVICE, &url, || {
            self.http.delete(&url).bearer_auth(&self.token)
        })
        .await?;
        Ok(())
    }

    /// Runs a course provisioning report for a term and returns its CSV.
    /// The remote report is deleted once the body is in hand.
    pub async fn fetch_course_provisioning_report(
        &self,
        account: &str,
        canvas_term_id: i64,
    ) -> Result<String, GatewayError> {
        let term_id = canvas_term_id.to_string();
        let report = self
            .create_report(
                account,
                "provisioning_csv",
                &[
                    ("parameters[courses]", "true"),
                    ("parameters[include_deleted]", "true"),
                    ("parameters[enrollment_term_id]", &term_id),
                ],
            )
            .await?;
        let data = self.get_report_data(&report).await?;
        self.delete_report(&report).await?;
        Ok(data)
    }

    /// Runs a user provisioning report and returns its CSV.
    pub async fn fetch_user_provisioning_report(
        &self,
        account: &str,
    ) -> Result<String, GatewayError> {
        let report = self
            .create_report(account, "provisioning_csv", &[("parameters[users]", "true")])
            .await?;
        let data = self.get_report_data(&report).await?;
        self.delete_report(&report).await?;
        Ok(data)
    }

    /// Runs a cross-listing report for a term and returns its CSV.
    pub async fn fetch_xlist_report(
        &self,
        account: &str,
        canvas_term_id: i64,
    ) -> Result<String, GatewayError> {
        let term_id = canvas_term_id.to_string();
        let report = self
            .create_report(
                account,
                "xlist_csv",
                &[
                    ("parameters[include_deleted]", "true"),
                    ("parameters[enrollment_term_id]", &term_id),
                ],
            )
            .await?;
        let data = self.get_report_data(&report).await?;
        self.delete_report(&report).await?;
        Ok(data)
    }
}

fn next_link(response: &reqwest::Response) -> Option<String> {
    let header = response
        .headers()
        .get(reqwest::header::LINK)?
        .to_str()
        .ok()?;
    for part in header.split(',') {
        let mut segments = part.trim().split(';');
        let url_part = segments.next().unwrap_or_default().trim();
        if segments.any(|s| s.trim() == "rel=\"next\"") {
            return Some(
                url_part
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string(),
            );
        }
    }
    None
}
