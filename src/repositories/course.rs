//! # Course Repository
//!
//! Upserts courses sourced from the provisioning report and resolves
//! the active course set for a term.

use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::models::course::{ActiveModel, Column, Entity, Model};

/// A course row parsed from the provisioning report.
#[derive(Debug, Clone)]
pub struct CourseUpsert {
    pub canvas_course_id: i64,
    pub sis_course_id: Option<String>,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub canvas_account_id: Option<i64>,
    pub sis_account_id: Option<String>,
    pub status: Option<String>,
}

/// Repository for course database operations
pub struct CourseRepository {
    db: DatabaseConnection,
}

impl CourseRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts or refreshes courses for a term, keyed on
    /// (canvas_course_id, term_id). Returns the number of rows written.
    pub async fn upsert_batch(
        &self,
        term_id: i32,
        courses: Vec<CourseUpsert>,
    ) -> Result<usize, sea_orm::DbErr> {
        if courses.is_empty() {
            return Ok(0);
        }
        let count = courses.len();
        let rows: Vec<ActiveModel> = courses
            .into_iter()
            .map(|c| ActiveModel {
                canvas_course_id: Set(c.canvas_course_id),
                sis_course_id: Set(c.sis_course_id),
                short_name: Set(c.short_name),
                long_name: Set(c.long_name),
                canvas_account_id: Set(c.canvas_account_id),
                sis_account_id: Set(c.sis_account_id),
                status: Set(c.status),
                term_id: Set(term_id),
                ..Default::default()
            })
            .collect();

        Entity::insert_many(rows)
            .on_conflict(
                OnConflict::columns([Column::CanvasCourseId, Column::TermId])
                    .update_columns([
                        Column::SisCourseId,
                        Column::ShortName,
                        Column::LongName,
                        Column::CanvasAccountId,
                        Column::SisAccountId,
                        Column::Status,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(count)
    }

    /// Courses with `active` provisioning status in a term, ordered by
    /// canvas course id for stable job creation.
    pub async fn active_courses_for_term(
        &self,
        term_id: i32,
    ) -> Result<Vec<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::TermId.eq(term_id))
            .filter(Column::Status.eq("active"))
            .order_by_asc(Column::CanvasCourseId)
            .all(&self.db)
            .await
    }

    pub async fn find_by_canvas_course_id(
        &self,
        term_id: i32,
        canvas_course_id: i64,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::TermId.eq(term_id))
            .filter(Column::CanvasCourseId.eq(canvas_course_id))
            .one(&self.db)
            .await
    }
}
