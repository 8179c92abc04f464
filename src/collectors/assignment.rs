//! Assignment analytics collector.

use sea_orm::{DatabaseConnection, Set};

use crate::canvas::CanvasClient;
use crate::models::assignment::ActiveModel;
use crate::models::job;
use crate::repositories::{
    AssignmentRepository, CourseRepository, TermRepository, UserRepository, WeekRepository,
};

use super::{CollectorError, JobContext};

/// Collects one job's worth of assignment analytics: every assignment
/// snapshot for every student in the job's course.
pub struct AssignmentCollector {
    db: DatabaseConnection,
    canvas: CanvasClient,
}

impl AssignmentCollector {
    pub fn new(db: DatabaseConnection, canvas: CanvasClient) -> Self {
        Self { db, canvas }
    }

    /// Runs the collection for a claimed job. Returns the number of
    /// rows written.
    pub async fn collect(&self, job: &job::Model) -> Result<usize, CollectorError> {
        let context = JobContext::from_value(&job.context)?;

        let term = TermRepository::new(self.db.clone())
            .find_by_sis_term_id(&context.sis_term_id)
            .await?
            .ok_or_else(|| CollectorError::TermNotFound {
                sis_term_id: context.sis_term_id.clone(),
            })?;
        let course = CourseRepository::new(self.db.clone())
            .find_by_canvas_course_id(term.id, context.canvas_course_id)
            .await?
            .ok_or_else(|| CollectorError::CourseNotFound {
                canvas_course_id: context.canvas_course_id,
                sis_term_id: context.sis_term_id.clone(),
            })?;
        let week = WeekRepository::new(self.db.clone())
            .get_or_create(term.id, context.week as i32)
            .await?;

        let analytics = self
            .canvas
            .collect_assignment_analytics(context.canvas_course_id)
            .await?;

        let canvas_user_ids: Vec<i64> = analytics.iter().map(|a| a.canvas_user_id).collect();
        let user_ids = UserRepository::new(self.db.clone())
            .find_ids_by_canvas_ids(&canvas_user_ids)
            .await?;

        let mut rows = Vec::with_capacity(analytics.len());
        for item in analytics {
            let Some(user_id) = user_ids.get(&item.canvas_user_id) else {
                tracing::warn!(
                    canvas_user_id = item.canvas_user_id,
                    canvas_course_id = context.canvas_course_id,
                    "skipping analytics for unknown user"
                );
                continue;
            };
            let submission = item.submission.unwrap_or(crate::canvas::SubmissionAnalytics {
                score: None,
                posted_at: None,
                submitted_at: None,
            });
            rows.push(ActiveModel {
                job_id: Set(job.id),
                week_id: Set(week.id),
                course_id: Set(course.id),
                user_id: Set(*user_id),
                assignment_id: Set(Some(item.assignment_id)),
                title: Set(item.title),
                unlock_at: Set(item.unlock_at.map(|dt| dt.fixed_offset())),
                points_possible: Set(item.points_possible),
                non_digital_submission: Set(item.non_digital_submission),
                due_at: Set(item.due_at.map(|dt| dt.fixed_offset())),
                status: Set(item.status),
                muted: Set(item.muted),
                min_score: Set(item.min_score),
                max_score: Set(item.max_score),
                first_quartile: Set(item.first_quartile),
                median: Set(item.median),
                third_quartile: Set(item.third_quartile),
                excused: Set(item.excused),
                score: Set(submission.score),
                posted_at: Set(submission.posted_at.map(|dt| dt.fixed_offset())),
                submitted_at: Set(submission.submitted_at.map(|dt| dt.fixed_offset())),
                ..Default::default()
            });
        }

        let repo = AssignmentRepository::new(self.db.clone());
        repo.delete_by_job(job.id).await?;
        let written = repo.insert_batch(rows).await?;
        tracing::info!(
            job_id = job.id,
            canvas_course_id = context.canvas_course_id,
            week = context.week,
            written,
            "assignment collection complete"
        );
        Ok(written)
    }
}
