//! # Assignment Repository
//!
//! Writes weekly assignment analytics snapshots. Each collector run
//! replaces the rows it previously wrote for its job, then upserts on
//! the (user, course, assignment, week) key so a rerun never
//! duplicates a snapshot.

use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::models::assignment::{ActiveModel, Column, Entity};

/// Repository for assignment analytics database operations
pub struct AssignmentRepository {
    db: DatabaseConnection,
}

impl AssignmentRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Deletes rows previously written by a job.
    pub async fn delete_by_job(&self, job_id: i32) -> Result<u64, sea_orm::DbErr> {
        let res = Entity::delete_many()
            .filter(Column::JobId.eq(job_id))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }

    /// Upserts a batch of snapshots on the unique
    /// (user, course, assignment, week) key.
    pub async fn insert_batch(&self, rows: Vec<ActiveModel>) -> Result<usize, sea_orm::DbErr> {
        if rows.is_empty() {
            return Ok(0);
        }
        let count = rows.len();
        Entity::insert_many(rows)
            .on_conflict(
                OnConflict::columns([
                    Column::UserId,
                    Column::CourseId,
                    Column::AssignmentId,
                    Column::WeekId,
                ])
                .update_columns([
                    Column::JobId,
                    Column::Title,
                    Column::UnlockAt,
                    Column::PointsPossible,
                    Column::NonDigitalSubmission,
                    Column::DueAt,
                    Column::Status,
                    Column::Muted,
                    Column::MinScore,
                    Column::MaxScore,
                    Column::FirstQuartile,
                    Column::Median,
                    Column::ThirdQuartile,
                    Column::Excused,
                    Column::Score,
                    Column::PostedAt,
                    Column::SubmittedAt,
                ])
                .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(count)
    }

    pub async fn count_for_week(&self, week_id: i32) -> Result<u64, sea_orm::DbErr> {
        use sea_orm::PaginatorTrait;
        Entity::find()
            .filter(Column::WeekId.eq(week_id))
            .count(&self.db)
            .await
    }
}
