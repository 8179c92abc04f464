//! # Job Repository
//!
//! The job engine: creation, atomic claiming, lifecycle transitions,
//! and status derivation. Status is never stored; it is derived from
//! the raw pid/start/end/message fields so that a crashed worker's
//! jobs become reclaimable without any cleanup pass.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::models::job::{ActiveModel, Column, Entity, Model};
use crate::models::job_type;

/// Errors from job engine operations.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
    #[error("job {id} not found")]
    NotFound { id: i32 },
    #[error("job {id}: {reason}")]
    InvalidTransition { id: i32, reason: &'static str },
    #[error("unknown job status '{value}'")]
    UnknownStatus { value: String },
}

/// Derived lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Claimed,
    Running,
    Completed,
    Failed,
    Expired,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Claimed,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Expired,
    ];

    /// Derives the status of a job from its raw fields.
    ///
    /// Completion is checked before failure so that a job which
    /// finished cleanly is never reported failed, and failure before
    /// running so a message always surfaces.
    pub fn derive(job: &Model, now: DateTime<Utc>) -> JobStatus {
        if job.pid.is_some() && job.start.is_some() && job.end.is_some() && job.message.is_empty()
        {
            return JobStatus::Completed;
        }
        if !job.message.is_empty() {
            return JobStatus::Failed;
        }
        if job.pid.is_some() && job.start.is_some() {
            return JobStatus::Running;
        }
        if job.target_date_end < now.fixed_offset() {
            return JobStatus::Expired;
        }
        if job.pid.is_none() {
            return JobStatus::Pending;
        }
        JobStatus::Claimed
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Claimed => "claimed",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Expired => "expired",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for JobStatus {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "claimed" => Ok(JobStatus::Claimed),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "expired" => Ok(JobStatus::Expired),
            other => Err(JobError::UnknownStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// A job joined with its type discriminator and derived status.
#[derive(Debug, Clone, Serialize)]
pub struct JobWithStatus {
    #[serde(flatten)]
    pub job: Model,
    pub job_type: String,
    pub status: JobStatus,
}

/// Stamps a claim onto jobs: pid set, start/end cleared, message reset.
fn claim_update(worker_pid: i32) -> sea_orm::UpdateMany<Entity> {
    Entity::update_many()
        .col_expr(Column::Pid, Expr::value(worker_pid))
        .col_expr(Column::Start, Expr::value(Option::<DateTime<Utc>>::None))
        .col_expr(Column::End, Expr::value(Option::<DateTime<Utc>>::None))
        .col_expr(Column::Message, Expr::value(""))
}

/// Claim update for a single abandoned job, guarded on the pid the
/// selecting transaction observed.
fn reclaim_update(worker_pid: i32, observed: &Model) -> sea_orm::UpdateMany<Entity> {
    claim_update(worker_pid)
        .filter(Column::Id.eq(observed.id))
        .filter(Column::Pid.eq(observed.pid))
}

/// Repository for job database operations
pub struct JobRepository {
    db: DatabaseConnection,
}

impl JobRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Model, JobError> {
        Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(JobError::NotFound { id })
    }

    /// Creates a job for a target window, unless an identical open job
    /// already exists. Returns the job and whether it was created.
    pub async fn create_job(
        &self,
        job_type_id: i32,
        context: JsonValue,
        target_date_start: DateTime<Utc>,
        target_date_end: DateTime<Utc>,
    ) -> Result<(Model, bool), JobError> {
        let existing = Entity::find()
            .filter(Column::JobTypeId.eq(job_type_id))
            .filter(Column::Context.eq(context.clone()))
            .filter(Column::TargetDateStart.eq(target_date_start.fixed_offset()))
            .filter(Column::TargetDateEnd.eq(target_date_end.fixed_offset()))
            .one(&self.db)
            .await?;
        if let Some(job) = existing {
            return Ok((job, false));
        }

        let job = ActiveModel {
            job_type_id: Set(job_type_id),
            context: Set(context),
            target_date_start: Set(target_date_start.fixed_offset()),
            target_date_end: Set(target_date_end.fixed_offset()),
            message: Set(String::new()),
            created: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        Ok((job.insert(&self.db).await?, true))
    }

    /// Claims up to `batch_size` jobs of a type for this process.
    ///
    /// Pending jobs inside their target window are taken first, oldest
    /// created first. When none are pending, claimed-but-never-finished
    /// jobs still inside their window are reclaimed from dead workers.
    /// The claim is a guarded update inside a transaction so two
    /// workers never take the same job.
    pub async fn claim_batch(
        &self,
        job_type_id: i32,
        batch_size: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Model>, JobError> {
        let pid = std::process::id() as i32;
        let txn = self.db.begin().await?;

        let in_window = |q: sea_orm::Select<Entity>| {
            q.filter(Column::JobTypeId.eq(job_type_id))
                .filter(Column::TargetDateStart.lte(now.fixed_offset()))
                .filter(Column::TargetDateEnd.gte(now.fixed_offset()))
        };

        let pending: Vec<Model> = in_window(Entity::find())
            .filter(Column::Pid.is_null())
            .order_by_asc(Column::Created)
            .order_by_asc(Column::Id)
            .limit(batch_size)
            .all(&txn)
            .await?;

        let ids: Vec<i32> = if !pending.is_empty() {
            let ids: Vec<i32> = pending.iter().map(|j| j.id).collect();
            // Guard against a racing worker that claimed between the
            // select and this update.
            claim_update(pid)
                .filter(Column::Id.is_in(ids.clone()))
                .filter(Column::Pid.is_null())
                .exec(&txn)
                .await?;
            ids
        } else {
            let reclaimable: Vec<Model> = in_window(Entity::find())
                .filter(Column::Pid.is_not_null())
                .filter(Column::End.is_null())
                .filter(Column::Message.eq(""))
                .order_by_asc(Column::Created)
                .order_by_asc(Column::Id)
                .limit(batch_size)
                .all(&txn)
                .await?;
            if reclaimable.is_empty() {
                txn.commit().await?;
                return Ok(Vec::new());
            }
            tracing::warn!("Reclaiming {} jobs", reclaimable.len());
            // Each update is guarded on the pid observed in the select,
            // so a row re-claimed by a racing worker in the meantime is
            // left alone.
            for job in &reclaimable {
                reclaim_update(pid, job).exec(&txn).await?;
            }
            reclaimable.iter().map(|j| j.id).collect()
        };

        // Re-read with a pid filter: rows lost to a racing worker are
        // dropped from the batch.
        let claimed: Vec<Model> = Entity::find()
            .filter(Column::Id.is_in(ids))
            .filter(Column::Pid.eq(pid))
            .order_by_asc(Column::Created)
            .order_by_asc(Column::Id)
            .all(&txn)
            .await?;

        txn.commit().await?;
        Ok(claimed)
    }

    /// Marks a claimed job as running. Starting a job that no worker
    /// holds would leave its fields outside the status machine.
    pub async fn start_job(&self, id: i32) -> Result<(), JobError> {
        let job = self.find_by_id(id).await?;
        if job.pid.is_none() {
            return Err(JobError::InvalidTransition {
                id,
                reason: "cannot start a job that has not been claimed",
            });
        }
        let mut job: ActiveModel = job.into();
        job.start = Set(Some(Utc::now().fixed_offset()));
        job.update(&self.db).await?;
        Ok(())
    }

    /// Marks a running job as completed. Any failure message from an
    /// earlier run is cleared so the job reads as completed.
    pub async fn end_job(&self, id: i32) -> Result<(), JobError> {
        let job = self.find_by_id(id).await?;
        if job.pid.is_none() || job.start.is_none() {
            return Err(JobError::InvalidTransition {
                id,
                reason: "cannot end a job that has not been started",
            });
        }
        let mut job: ActiveModel = job.into();
        job.end = Set(Some(Utc::now().fixed_offset()));
        job.message = Set(String::new());
        job.update(&self.db).await?;
        Ok(())
    }

    /// Records a failure message. The end timestamp is cleared so the
    /// job reads as failed, not completed.
    pub async fn fail_job(&self, id: i32, message: &str) -> Result<(), JobError> {
        let mut job: ActiveModel = self.find_by_id(id).await?.into();
        job.message = Set(message.to_string());
        job.end = Set(None);
        job.update(&self.db).await?;
        Ok(())
    }

    /// Resets a job to pending and re-opens its target window to the
    /// next 24 hours so it is claimable again immediately.
    pub async fn restart_job(&self, id: i32) -> Result<(), JobError> {
        let now = Utc::now();
        let mut job: ActiveModel = self.find_by_id(id).await?.into();
        job.target_date_start = Set(now.fixed_offset());
        job.target_date_end = Set((now + Duration::hours(24)).fixed_offset());
        job.pid = Set(None);
        job.start = Set(None);
        job.end = Set(None);
        job.message = Set(String::new());
        job.update(&self.db).await?;
        Ok(())
    }

    /// Clears a job's claim and run state without touching its window.
    pub async fn clear_job(&self, id: i32) -> Result<(), JobError> {
        let mut job: ActiveModel = self.find_by_id(id).await?.into();
        job.pid = Set(None);
        job.start = Set(None);
        job.end = Set(None);
        job.message = Set(String::new());
        job.update(&self.db).await?;
        Ok(())
    }

    pub async fn restart_jobs(&self, ids: &[i32]) -> Result<usize, JobError> {
        for id in ids {
            self.restart_job(*id).await?;
        }
        Ok(ids.len())
    }

    pub async fn clear_jobs(&self, ids: &[i32]) -> Result<usize, JobError> {
        for id in ids {
            self.clear_job(*id).await?;
        }
        Ok(ids.len())
    }

    /// All jobs joined with their type name and derived status.
    /// Status filtering applies to the derived status, so the admin
    /// listing filters and pages in memory after this fetch.
    pub async fn list_with_status(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobWithStatus>, JobError> {
        let rows = Entity::find()
            .find_also_related(job_type::Entity)
            .order_by_desc(Column::Created)
            .order_by_desc(Column::Id)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(job, jt)| {
                let status = JobStatus::derive(&job, now);
                JobWithStatus {
                    job_type: jt.map(|t| t.job_type).unwrap_or_default(),
                    status,
                    job,
                }
            })
            .collect())
    }

    /// Counts of jobs per derived status, for the admin chart.
    pub async fn status_counts(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(JobStatus, u64)>, JobError> {
        let rows = Entity::find().all(&self.db).await?;
        let mut counts: Vec<(JobStatus, u64)> =
            JobStatus::ALL.iter().map(|s| (*s, 0u64)).collect();
        for job in &rows {
            let status = JobStatus::derive(job, now);
            if let Some(entry) = counts.iter_mut().find(|(s, _)| *s == status) {
                entry.1 += 1;
            }
        }
        Ok(counts)
    }

    /// True when any job for the given term and week is still pending,
    /// claimed, or running. Used to guard exports against partial data.
    pub async fn has_unfinished_jobs(
        &self,
        sis_term_id: &str,
        week: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, JobError> {
        let rows = Entity::find().all(&self.db).await?;
        let unfinished = rows.iter().any(|job| {
            let ctx_term = job.context.get("sis_term_id").and_then(|v| v.as_str());
            let ctx_week = job.context.get("week").and_then(|v| v.as_u64());
            if ctx_term != Some(sis_term_id) || ctx_week != Some(week as u64) {
                return false;
            }
            matches!(
                JobStatus::derive(job, now),
                JobStatus::Pending | JobStatus::Claimed | JobStatus::Running
            )
        });
        Ok(unfinished)
    }
}
