//! # Participation Repository
//!
//! Writes weekly participation summaries, one row per
//! (user, course, week).

use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::models::participation::{ActiveModel, Column, Entity};

/// Repository for participation analytics database operations
pub struct ParticipationRepository {
    db: DatabaseConnection,
}

impl ParticipationRepository {
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

    /// Upserts a batch of summaries on the unique
    /// (user, course, week) key.
    pub async fn insert_batch(&self, rows: Vec<ActiveModel>) -> Result<usize, sea_orm::DbErr> {
        if rows.is_empty() {
            return Ok(0);
        }
        let count = rows.len();
        Entity::insert_many(rows)
            .on_conflict(
                OnConflict::columns([Column::UserId, Column::CourseId, Column::WeekId])
                    .update_columns([
                        Column::JobId,
                        Column::PageViews,
                        Column::MaxPageViews,
                        Column::PageViewsLevel,
                        Column::Participations,
                        Column::MaxParticipations,
                        Column::ParticipationsLevel,
                        Column::TimeTardy,
                        Column::TimeOnTime,
                        Column::TimeLate,
                        Column::TimeMissing,
                        Column::TimeFloating,
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
