//! Canvas LMS gateway.
//!
//! A thin reqwest-based client for the Canvas REST API plus the retry
//! policy shared with the term calendar client. Analytics requests
//! retry on a small set of transient statuses with exponential backoff;
//! account report requests use a wider status list.

pub mod cache;
pub mod client;

pub use client::{
    AccountActivity, AssignmentAnalytics, CanvasAccount, CanvasClient, CanvasCourse, CanvasReport,
    CanvasTerm, ParticipationAnalytics, SubmissionAnalytics, TardinessBreakdown,
};

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the LMS gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("{service} request to {url} failed with status {status} after {tries} tries")]
    DataFailure {
        service: String,
        url: String,
        status: u16,
        tries: u32,
    },
    #[error("report {report_id} did not complete: {state}")]
    ReportFailed { report_id: i64, state: String },
    #[error("report {report_id} completed without an attachment")]
    ReportMissingAttachment { report_id: i64 },
}

impl GatewayError {
    /// Upstream HTTP status, when one was observed. Network-level
    /// failures are recorded as status 0.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::DataFailure { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Retry policy for upstream requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_tries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: u32,
    pub retry_statuses: &'static [u16],
}

impl RetryPolicy {
    /// Policy for per-course analytics endpoints.
    pub fn analytics() -> Self {
        Self {
            max_tries: 5,
            initial_delay: Duration::from_secs(3),
            backoff_factor: 2,
            retry_statuses: &[0, 403, 500],
        }
    }

    /// Policy for account reports and account-level analytics.
    pub fn reports() -> Self {
        Self {
            max_tries: 5,
            initial_delay: Duration::from_secs(3),
            backoff_factor: 2,
            retry_statuses: &[0, 408, 500, 502, 503, 504],
        }
    }
}

/// Sends a request built by `build`, retrying per `policy`.
///
/// A transport-level failure is treated as status 0. Non-success
/// statuses outside the policy's retry list fail immediately.
pub async fn send_with_retry<F>(
    policy: &RetryPolicy,
    service: &str,
    url: &str,
    build: F,
) -> Result<reqwest::Response, GatewayError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let status = match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                status.as_u16()
            }
            Err(err) => {
                tracing::warn!(service, url, error = %err, "request transport failure");
                0
            }
        };

        if !policy.retry_statuses.contains(&status) || attempt >= policy.max_tries {
            return Err(GatewayError::DataFailure {
                service: service.to_string(),
                url: url.to_string(),
                status,
                tries: attempt,
            });
        }

        tracing::warn!(
            service,
            url,
            status,
            attempt,
            delay_secs = delay.as_secs(),
            "retrying request after failure"
        );
        tokio::time::sleep(delay).await;
        delay *= policy.backoff_factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analytics_policy_statuses() {
        let policy = RetryPolicy::analytics();
        assert_eq!(policy.max_tries, 5);
        assert_eq!(policy.initial_delay, Duration::from_secs(3));
        assert!(policy.retry_statuses.contains(&0));
        assert!(policy.retry_statuses.contains(&403));
        assert!(policy.retry_statuses.contains(&500));
        assert!(!policy.retry_statuses.contains(&404));
    }

    #[test]
    fn reports_policy_statuses() {
        let policy = RetryPolicy::reports();
        assert_eq!(policy.max_tries, 5);
        assert_eq!(policy.initial_delay, Duration::from_secs(3));
        for status in [0, 408, 500, 502, 503, 504] {
            assert!(policy.retry_statuses.contains(&status));
        }
        assert!(!policy.retry_statuses.contains(&403));
    }

    #[test]
    fn data_failure_exposes_status() {
        let err = GatewayError::DataFailure {
            service: "canvas".to_string(),
            url: "https://canvas.example.com/api/v1/courses/1".to_string(),
            status: 404,
            tries: 1,
        };
        assert_eq!(err.status(), Some(404));
    }
}
