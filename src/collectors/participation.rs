//! Participation analytics collector.

use sea_orm::{DatabaseConnection, Set};

use crate::canvas::CanvasClient;
use crate::models::job;
use crate::models::participation::ActiveModel;
use crate::repositories::{
    CourseRepository, ParticipationRepository, TermRepository, UserRepository, WeekRepository,
};

use super::{CollectorError, JobContext};

/// Collects one job's worth of participation summaries: one row per
/// student in the job's course for the job's week.
pub struct ParticipationCollector {
    db: DatabaseConnection,
    canvas: CanvasClient,
}

impl ParticipationCollector {
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
            .collect_participation_analytics(context.canvas_course_id)
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
                    "skipping summary for unknown user"
                );
                continue;
            };
            let tardiness = item.tardiness_breakdown.unwrap_or_default();
            rows.push(ActiveModel {
                job_id: Set(job.id),
                week_id: Set(week.id),
                course_id: Set(course.id),
                user_id: Set(*user_id),
                page_views: Set(item.page_views.map(|v| v as i32)),
                max_page_views: Set(item.max_page_views.map(|v| v as i32)),
                page_views_level: Set(item.page_views_level.map(|v| v as i32)),
                participations: Set(item.participations.map(|v| v as i32)),
                max_participations: Set(item.max_participations.map(|v| v as i32)),
                participations_level: Set(item.participations_level.map(|v| v as i32)),
                time_tardy: Set(tardiness.total.map(|v| v as i32)),
                time_on_time: Set(tardiness.on_time.map(|v| v as i32)),
                time_late: Set(tardiness.late.map(|v| v as i32)),
                time_missing: Set(tardiness.missing.map(|v| v as i32)),
                time_floating: Set(tardiness.floating.map(|v| v as i32)),
                ..Default::default()
            });
        }

        let repo = ParticipationRepository::new(self.db.clone());
        repo.delete_by_job(job.id).await?;
        let written = repo.insert_batch(rows).await?;
        tracing::info!(
            job_id = job.id,
            canvas_course_id = context.canvas_course_id,
            week = context.week,
            written,
            "participation collection complete"
        );
        Ok(written)
    }
}
