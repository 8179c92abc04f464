//! Job runner: claims a batch of jobs and fans them out to the
//! collectors under a concurrency limit.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use tokio::sync::Semaphore;

use crate::canvas::CanvasClient;
use crate::config::CollectorConfig;
use crate::models::job_type;
use crate::repositories::{JobRepository, JobTypeRepository};

use super::assignment::AssignmentCollector;
use super::participation::ParticipationCollector;
use super::CollectorError;

/// Which collector a run dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorKind {
    Assignment,
    Participation,
}

impl CollectorKind {
    pub fn job_type(self) -> &'static str {
        match self {
            CollectorKind::Assignment => job_type::ASSIGNMENT,
            CollectorKind::Participation => job_type::PARTICIPATION,
        }
    }
}

/// Outcome of one runner invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Claims and runs one batch of jobs. Failed jobs keep their failure
/// message and are left for an operator to restart; there is no
/// automatic retry beyond the per-request policy.
pub struct JobRunner {
    db: DatabaseConnection,
    canvas: CanvasClient,
    batch_size: u64,
    concurrency: usize,
}

impl JobRunner {
    pub fn new(db: DatabaseConnection, canvas: CanvasClient, config: &CollectorConfig) -> Self {
        Self {
            db,
            canvas,
            batch_size: config.batch_size,
            concurrency: config.concurrency,
        }
    }

    /// Runs one batch of jobs of the given kind.
    pub async fn run(&self, kind: CollectorKind) -> Result<RunSummary, CollectorError> {
        let batch_started = Instant::now();
        let job_type = JobTypeRepository::new(self.db.clone())
            .get_or_create(kind.job_type())
            .await?;
        let jobs = JobRepository::new(self.db.clone())
            .claim_batch(job_type.id, self.batch_size, chrono::Utc::now())
            .await?;

        let mut summary = RunSummary {
            claimed: jobs.len(),
            ..Default::default()
        };
        if jobs.is_empty() {
            tracing::info!(job_type = kind.job_type(), "no jobs to run");
            return Ok(summary);
        }
        tracing::info!(
            job_type = kind.job_type(),
            claimed = jobs.len(),
            "running job batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let semaphore = Arc::clone(&semaphore);
            let db = self.db.clone();
            let canvas = self.canvas.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let job_id = job.id;
                let repo = JobRepository::new(db.clone());
                if let Err(err) = repo.start_job(job_id).await {
                    tracing::error!(job_id, error = %err, "failed to start job");
                    return false;
                }
                let result = match kind {
                    CollectorKind::Assignment => {
                        AssignmentCollector::new(db.clone(), canvas).collect(&job).await
                    }
                    CollectorKind::Participation => {
                        ParticipationCollector::new(db.clone(), canvas)
                            .collect(&job)
                            .await
                    }
                };
                match result {
                    Ok(_) => match repo.end_job(job_id).await {
                        Ok(()) => true,
                        Err(err) => {
                            tracing::error!(job_id, error = %err, "failed to finish job");
                            false
                        }
                    },
                    Err(err) => {
                        let message = format!("{:#}", anyhow::Error::new(err));
                        tracing::error!(job_id, error = %message, "job failed");
                        if let Err(fail_err) = repo.fail_job(job_id, &message).await {
                            tracing::error!(job_id, error = %fail_err, "failed to record job failure");
                        }
                        false
                    }
                }
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(true) => summary.succeeded += 1,
                Ok(false) => summary.failed += 1,
                Err(err) => {
                    tracing::error!(error = %err, "job task panicked");
                    summary.failed += 1;
                }
            }
        }

        counter!("jobs_claimed_total", "job_type" => kind.job_type())
            .increment(summary.claimed as u64);
        counter!("jobs_succeeded_total", "job_type" => kind.job_type())
            .increment(summary.succeeded as u64);
        counter!("jobs_failed_total", "job_type" => kind.job_type())
            .increment(summary.failed as u64);
        histogram!("job_batch_duration_seconds", "job_type" => kind.job_type())
            .record(batch_started.elapsed().as_secs_f64());

        tracing::info!(
            job_type = kind.job_type(),
            succeeded = summary.succeeded,
            failed = summary.failed,
            "job batch finished"
        );
        Ok(summary)
    }
}
