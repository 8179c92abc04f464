//! # Term Repository
//!
//! Repository operations for the terms table: materializing terms from
//! the student web service and resolving the current term.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::calendar::{self, SwsTerm};
use crate::models::term::{ActiveModel, Column, Entity, Model};

/// Repository for term database operations
pub struct TermRepository {
    db: DatabaseConnection,
}

impl TermRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Finds a term by its sis term id.
    pub async fn find_by_sis_term_id(
        &self,
        sis_term_id: &str,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::SisTermId.eq(sis_term_id))
            .one(&self.db)
            .await
    }

    /// Finds the term whose quarter contains `now`: first day of
    /// quarter has passed and the grade submission deadline has not.
    pub async fn find_current(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::FirstDayQuarter.lte(now.date_naive()))
            .filter(Column::GradeSubmissionDeadline.gte(now.fixed_offset()))
            .order_by_asc(Column::FirstDayQuarter)
            .one(&self.db)
            .await
    }

    /// Lists all terms.
    pub async fn all(&self) -> Result<Vec<Model>, sea_orm::DbErr> {
        Entity::find().order_by_asc(Column::Id).all(&self.db).await
    }

    /// Creates a term from SWS metadata, or returns the existing row.
    /// The boolean is true when a row was created.
    pub async fn get_or_create_from_sws_term(
        &self,
        sws_term: &SwsTerm,
    ) -> Result<(Model, bool), sea_orm::DbErr> {
        let sis_term_id = sws_term.sis_term_id();
        if let Some(existing) = self.find_by_sis_term_id(&sis_term_id).await? {
            return Ok((existing, false));
        }

        let term = ActiveModel {
            canvas_term_id: Set(None),
            sis_term_id: Set(Some(sis_term_id.clone())),
            year: Set(Some(sws_term.year)),
            quarter: Set(Some(sws_term.quarter.to_lowercase())),
            label: Set(Some(sws_term.label())),
            last_day_add: Set(sws_term.last_day_add),
            last_day_drop: Set(sws_term.last_day_drop),
            first_day_quarter: Set(sws_term.first_day_quarter),
            census_day: Set(sws_term.census_day),
            last_day_instruction: Set(sws_term.last_day_instruction),
            grading_period_open: Set(sws_term
                .grading_period_open
                .map(|dt| dt.and_utc().fixed_offset())),
            aterm_grading_period_open: Set(sws_term
                .aterm_grading_period_open
                .map(|dt| dt.and_utc().fixed_offset())),
            grade_submission_deadline: Set(sws_term
                .grade_submission_deadline
                .map(|dt| dt.and_utc().fixed_offset())),
            last_final_exam_date: Set(sws_term
                .last_final_exam_date
                .map(|dt| dt.and_utc().fixed_offset())),
            ..Default::default()
        };

        let created = term.insert(&self.db).await?;
        tracing::info!(sis_term_id, "created term");
        Ok((created, true))
    }

    /// Records the Canvas enrollment term id on a term.
    pub async fn set_canvas_term_id(
        &self,
        term_id: i32,
        canvas_term_id: i64,
    ) -> Result<(), sea_orm::DbErr> {
        let mut active: ActiveModel = Entity::find_by_id(term_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| sea_orm::DbErr::RecordNotFound(format!("term {}", term_id)))?
            .into();
        active.canvas_term_id = Set(Some(canvas_term_id));
        active.update(&self.db).await?;
        Ok(())
    }
}

/// Week of term for a given instant, 0 before the term starts.
pub fn relative_week(term: &Model, now: DateTime<Utc>) -> u32 {
    match term.first_day_quarter {
        Some(first_day) => calendar::get_relative_week(first_day, now),
        None => 0,
    }
}
