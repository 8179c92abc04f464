//! # Report Repository
//!
//! Tracks subaccount activity report runs and their per-account
//! counters.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::models::report;
use crate::models::subaccount_activity;

/// Counter updates applied to a stored activity row after the course
/// provisioning and cross-listing reports are folded in.
#[derive(Debug, Clone, Copy, Default)]
pub struct CourseTotals {
    pub courses: i32,
    pub active_courses: i32,
    pub ind_study_courses: i32,
    pub active_ind_study_courses: i32,
    pub xlist_courses: i32,
    pub xlist_ind_study_courses: i32,
}

/// Repository for report database operations
pub struct ReportRepository {
    db: DatabaseConnection,
}

impl ReportRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Starts a report run of the given type for a term.
    pub async fn create(
        &self,
        report_type: &str,
        sis_term_id: &str,
        term_week: Option<i32>,
    ) -> Result<report::Model, sea_orm::DbErr> {
        let row = report::ActiveModel {
            report_type: Set(report_type.to_string()),
            started_date: Set(Utc::now().fixed_offset()),
            finished_date: Set(None),
            term_id: Set(sis_term_id.to_string()),
            term_week: Set(term_week),
            ..Default::default()
        };
        row.insert(&self.db).await
    }

    /// Stamps the report as finished.
    pub async fn finish(&self, report_id: i32) -> Result<(), sea_orm::DbErr> {
        let mut row: report::ActiveModel = report::Entity::find_by_id(report_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| sea_orm::DbErr::RecordNotFound(format!("report {}", report_id)))?
            .into();
        row.finished_date = Set(Some(Utc::now().fixed_offset()));
        row.update(&self.db).await?;
        Ok(())
    }

    /// Records one subaccount's activity counters under a report run.
    pub async fn add_activity(
        &self,
        activity: subaccount_activity::ActiveModel,
    ) -> Result<subaccount_activity::Model, sea_orm::DbErr> {
        activity.insert(&self.db).await
    }

    /// Activities recorded for a report run, ordered by subaccount id.
    pub async fn activities_for_report(
        &self,
        report_id: i32,
    ) -> Result<Vec<subaccount_activity::Model>, sea_orm::DbErr> {
        subaccount_activity::Entity::find()
            .filter(subaccount_activity::Column::ReportId.eq(report_id))
            .order_by_asc(subaccount_activity::Column::SubaccountId)
            .all(&self.db)
            .await
    }

    /// Applies course totals accumulated from the provisioning and
    /// cross-listing reports to a stored activity row.
    pub async fn update_course_totals(
        &self,
        activity_id: i32,
        totals: CourseTotals,
    ) -> Result<(), sea_orm::DbErr> {
        let mut row: subaccount_activity::ActiveModel =
            subaccount_activity::Entity::find_by_id(activity_id)
                .one(&self.db)
                .await?
                .ok_or_else(|| {
                    sea_orm::DbErr::RecordNotFound(format!("subaccount activity {}", activity_id))
                })?
                .into();
        row.courses = Set(totals.courses);
        row.active_courses = Set(totals.active_courses);
        row.ind_study_courses = Set(totals.ind_study_courses);
        row.active_ind_study_courses = Set(totals.active_ind_study_courses);
        row.xlist_courses = Set(totals.xlist_courses);
        row.xlist_ind_study_courses = Set(totals.xlist_ind_study_courses);
        row.update(&self.db).await?;
        Ok(())
    }

    /// The most recent finished report of a type for a term.
    pub async fn latest_finished(
        &self,
        report_type: &str,
        sis_term_id: &str,
    ) -> Result<Option<report::Model>, sea_orm::DbErr> {
        report::Entity::find()
            .filter(report::Column::ReportType.eq(report_type))
            .filter(report::Column::TermId.eq(sis_term_id))
            .filter(report::Column::FinishedDate.is_not_null())
            .order_by_desc(report::Column::StartedDate)
            .one(&self.db)
            .await
    }
}
