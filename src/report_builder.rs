//! # Subaccount Activity Report
//!
//! Walks an account tree, records per-subaccount activity counters for
//! a term, then folds in course totals from the course provisioning
//! and cross-listing reports. Course rows roll up into every ancestor
//! subaccount by sis id prefix.

use std::collections::HashMap;

use sea_orm::{DatabaseConnection, Set};
use thiserror::Error;

use crate::canvas::{CanvasClient, GatewayError};
use crate::models::report;
use crate::models::subaccount_activity::ActiveModel;
use crate::repositories::{CourseTotals, ReportRepository};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("root account {account} has no sis account id")]
    MissingSisAccountId { account: String },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Builds the subaccount activity report.
pub struct ReportBuilder {
    db: DatabaseConnection,
    canvas: CanvasClient,
}

impl ReportBuilder {
    pub fn new(db: DatabaseConnection, canvas: CanvasClient) -> Self {
        Self { db, canvas }
    }

    /// Runs the full report for a root account, term, and week.
    /// Returns the report row id.
    pub async fn build_subaccount_activity_report(
        &self,
        root_account_id: &str,
        sis_term_id: &str,
        week: u32,
    ) -> Result<i32, ReportError> {
        let reports = ReportRepository::new(self.db.clone());
        let report = reports
            .create(report::SUBACCOUNT_ACTIVITY, sis_term_id, Some(week as i32))
            .await?;
        tracing::info!(
            report_id = report.id,
            sis_term_id,
            week,
            "building subaccount activity report"
        );

        let root = self.canvas.get_account(root_account_id).await?;
        let root_segment = root.id.to_string();
        let mut accounts = vec![root.clone()];
        accounts.extend(self.canvas.list_sub_accounts(&root_segment).await?);

        // sis_account_id -> stored activity row id, filled as activities
        // are recorded.
        let mut activity_ids: HashMap<String, i32> = HashMap::new();
        for account in &accounts {
            let Some(sis_account_id) = account.sis_account_id.as_deref() else {
                continue;
            };
            let mut activity = ActiveModel {
                report_id: Set(report.id),
                term_id: Set(sis_term_id.to_string()),
                subaccount_id: Set(sis_account_id.to_string()),
                subaccount_name: Set(account.name.clone()),
                ..Default::default()
            };

            let statistics = self
                .canvas
                .get_account_statistics(sis_account_id, sis_term_id)
                .await?;
            for (key, value) in &statistics {
                if key == "courses" {
                    continue;
                }
                apply_statistic(&mut activity, key, value);
            }

            match self
                .canvas
                .get_account_activity(sis_account_id, sis_term_id)
                .await
            {
                Ok(account_activity) => {
                    for item in &account_activity.by_category {
                        apply_category_views(
                            &mut activity,
                            &item.category,
                            item.views.unwrap_or(0) as i32,
                        );
                    }
                }
                // Activity rollups for large subaccounts routinely time
                // out upstream; record the statistics without them.
                Err(err) if err.status() == Some(504) => {
                    tracing::warn!(
                        sis_account_id,
                        "account activity timed out, skipping view counts"
                    );
                }
                Err(err) => return Err(err.into()),
            }

            let stored = reports.add_activity(activity).await?;
            activity_ids.insert(sis_account_id.to_string(), stored.id);
        }

        let canvas_term = self
            .canvas
            .get_enrollment_term(&root_segment, sis_term_id)
            .await?;
        let xlist_courses = self.xlist_course_ids(&root_segment, canvas_term.id).await?;
        let totals = self
            .course_totals(
                &root_segment,
                canvas_term.id,
                &activity_ids,
                &xlist_courses,
            )
            .await?;

        for (sis_account_id, account_totals) in &totals {
            if let Some(activity_id) = activity_ids.get(sis_account_id) {
                reports
                    .update_course_totals(*activity_id, *account_totals)
                    .await?;
            }
        }

        reports.finish(report.id).await?;
        tracing::info!(report_id = report.id, "subaccount activity report finished");
        Ok(report.id)
    }

    /// Distinct sis course ids from the cross-listing report.
    async fn xlist_course_ids(
        &self,
        root_segment: &str,
        canvas_term_id: i64,
    ) -> Result<std::collections::HashSet<String>, ReportError> {
        let data = self
            .canvas
            .fetch_xlist_report(root_segment, canvas_term_id)
            .await?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(data.as_bytes());
        let mut ids = std::collections::HashSet::new();
        for record in reader.records() {
            let record = record?;
            if let Some(sis_course_id) = record.get(6) {
                if !sis_course_id.is_empty() {
                    ids.insert(sis_course_id.to_string());
                }
            }
        }
        Ok(ids)
    }

    /// Accumulates course counters per subaccount from the course
    /// provisioning report. A course counts toward every subaccount
    /// whose sis id prefixes the course's account.
    async fn course_totals(
        &self,
        root_segment: &str,
        canvas_term_id: i64,
        activity_ids: &HashMap<String, i32>,
        xlist_courses: &std::collections::HashSet<String>,
    ) -> Result<HashMap<String, CourseTotals>, ReportError> {
        let data = self
            .canvas
            .fetch_course_provisioning_report(root_segment, canvas_term_id)
            .await?;
        let mut totals: HashMap<String, CourseTotals> = activity_ids
            .keys()
            .map(|k| (k.clone(), CourseTotals::default()))
            .collect();

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(data.as_bytes());
        for record in reader.records() {
            let record = record?;
            let (Some(sis_course_id), Some(sis_account_id)) = (record.get(1), record.get(6))
            else {
                continue;
            };
            if sis_course_id.is_empty() || sis_account_id.is_empty() {
                continue;
            }
            let status = record.get(9).unwrap_or_default();
            let ind_study = sis_course_id.split('-').count() == 6;
            let is_xlist = xlist_courses.contains(sis_course_id);
            let is_active = status == "active";

            for (sis_id, account_totals) in totals.iter_mut() {
                if !sis_account_id.starts_with(sis_id.as_str()) {
                    continue;
                }
                account_totals.courses += 1;
                if is_xlist {
                    account_totals.xlist_courses += 1;
                } else if is_active {
                    account_totals.active_courses += 1;
                }
                if ind_study {
                    account_totals.ind_study_courses += 1;
                    if is_xlist {
                        account_totals.xlist_ind_study_courses += 1;
                    } else if is_active {
                        account_totals.active_ind_study_courses += 1;
                    }
                }
            }
        }
        Ok(totals)
    }
}

/// Applies one statistics key to the counters it maps to. Keys the
/// schema does not track are ignored.
fn apply_statistic(activity: &mut ActiveModel, key: &str, value: &serde_json::Value) {
    let value = value.as_i64().unwrap_or(0) as i32;
    match key {
        "teachers" => activity.teachers = Set(value),
        "unique_teachers" => activity.unique_teachers = Set(value),
        "students" => activity.students = Set(value),
        "unique_students" => activity.unique_students = Set(value),
        "discussion_topics" => activity.discussion_topics = Set(value),
        "discussion_replies" => activity.discussion_replies = Set(value),
        "media_objects" => activity.media_objects = Set(value),
        "attachments" => activity.attachments = Set(value),
        "assignments" => activity.assignments = Set(value),
        "submissions" => activity.submissions = Set(value),
        other => {
            tracing::debug!(key = other, "ignoring unrecognized statistic");
        }
    }
}

/// Applies one activity category's view count.
fn apply_category_views(activity: &mut ActiveModel, category: &str, views: i32) {
    match category {
        "announcements" => activity.announcements_views = Set(views),
        "assignments" => activity.assignments_views = Set(views),
        "collaborations" => activity.collaborations_views = Set(views),
        "conferences" => activity.conferences_views = Set(views),
        "discussions" => activity.discussions_views = Set(views),
        "files" => activity.files_views = Set(views),
        "general" => activity.general_views = Set(views),
        "grades" => activity.grades_views = Set(views),
        "groups" => activity.groups_views = Set(views),
        "modules" => activity.modules_views = Set(views),
        "other" => activity.other_views = Set(views),
        "pages" => activity.pages_views = Set(views),
        "quizzes" => activity.quizzes_views = Set(views),
        other => {
            tracing::debug!(category = other, "ignoring unrecognized view category");
        }
    }
}
