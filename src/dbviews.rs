//! # Weekly Analytics Views
//!
//! (Re)creates the per-week database views over the assignments and
//! participations tables, plus the RAD view that normalizes both into
//! per-student scores on [-5, 5]. View names follow
//! `{term}_week_{N}_{label}` with hyphens mapped to underscores.
//!
//! SQLite (dev, tests) cannot replace a view in place, so views are
//! dropped and recreated there; Postgres uses CREATE OR REPLACE VIEW.

use chrono::{Days, NaiveDate};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};
use thiserror::Error;

use crate::calendar::{self, CalendarError};
use crate::models::{term, week};

#[derive(Debug, Error)]
pub enum ViewError {
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
    #[error("term {sis_term_id} is missing calendar dates")]
    MissingTermDates { sis_term_id: String },
}

/// One row of the RAD view.
#[derive(Debug, Clone)]
pub struct RadViewRow {
    pub canvas_user_id: i64,
    pub full_name: Option<String>,
    pub assignment_score: Option<f64>,
    pub participation_score: Option<f64>,
    pub grade: Option<f64>,
}

/// Builds and reads the weekly view chain.
pub struct ViewBuilder {
    db: DatabaseConnection,
}

impl ViewBuilder {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn term_ids(term: &term::Model) -> Result<(String, NaiveDate), ViewError> {
        let sis_term_id = term.sis_term_id.clone().unwrap_or_default();
        // Validates the YYYY-quarter shape before it lands in raw SQL.
        calendar::split_term_id(&sis_term_id)?;
        let first_day = term
            .first_day_quarter
            .ok_or_else(|| ViewError::MissingTermDates {
                sis_term_id: sis_term_id.clone(),
            })?;
        Ok((sis_term_id, first_day))
    }

    async fn create_view(&self, view_name: &str, body: &str) -> Result<(), ViewError> {
        let backend = self.db.get_database_backend();
        match backend {
            DatabaseBackend::Postgres => {
                let sql = format!("CREATE OR REPLACE VIEW \"{}\" AS {}", view_name, body);
                self.db
                    .execute(Statement::from_string(backend, sql))
                    .await?;
            }
            _ => {
                self.db
                    .execute(Statement::from_string(
                        backend,
                        format!("DROP VIEW IF EXISTS \"{}\"", view_name),
                    ))
                    .await?;
                self.db
                    .execute(Statement::from_string(
                        backend,
                        format!("CREATE VIEW \"{}\" AS {}", view_name, body),
                    ))
                    .await?;
            }
        }
        tracing::info!(view_name, "created view");
        Ok(())
    }

    /// Creates the weekly assignment view. Returns the view name.
    pub async fn create_assignment_view(
        &self,
        term: &term::Model,
        week: &week::Model,
    ) -> Result<String, ViewError> {
        let (sis_term_id, _) = Self::term_ids(term)?;
        let view_name = calendar::view_name(&sis_term_id, week.week as u32, "assignments")?;
        let body = format!(
            r#"SELECT
                terms.id AS term_id,
                weeks.id AS week_id,
                a.course_id,
                a.user_id,
                a.assignment_id,
                a.score,
                a.due_at,
                a.points_possible,
                a.status,
                a.excused,
                a.first_quartile,
                a.max_score,
                a.median,
                a.min_score,
                a.muted,
                a.non_digital_submission,
                a.posted_at,
                a.submitted_at,
                a.third_quartile,
                a.title
            FROM assignments a
            JOIN weeks ON a.week_id = weeks.id
            JOIN terms ON weeks.term_id = terms.id
            WHERE weeks.week = {week}
            AND terms.sis_term_id = '{term}'"#,
            week = week.week,
            term = sis_term_id,
        );
        self.create_view(&view_name, &body).await?;
        Ok(view_name)
    }

    /// Creates the weekly participation view. Returns the view name.
    pub async fn create_participation_view(
        &self,
        term: &term::Model,
        week: &week::Model,
    ) -> Result<String, ViewError> {
        let (sis_term_id, _) = Self::term_ids(term)?;
        let view_name = calendar::view_name(&sis_term_id, week.week as u32, "participations")?;
        let body = format!(
            r#"SELECT
                terms.id AS term_id,
                weeks.id AS week_id,
                p.course_id,
                p.user_id,
                p.participations AS participations,
                p.max_participations AS max_participations,
                p.participations_level AS participations_level,
                p.page_views AS page_views,
                p.max_page_views AS max_page_views,
                p.page_views_level AS page_views_level,
                p.time_tardy AS time_tardy,
                p.time_on_time AS time_on_time,
                p.time_late AS time_late,
                p.time_missing AS time_missing,
                p.time_floating AS time_floating
            FROM participations p
            JOIN weeks ON p.week_id = weeks.id
            JOIN terms ON weeks.term_id = terms.id
            WHERE weeks.week = {week}
            AND terms.sis_term_id = '{term}'"#,
            week = week.week,
            term = sis_term_id,
        );
        self.create_view(&view_name, &body).await?;
        Ok(view_name)
    }

    /// Creates the weekly RAD view over the assignment and
    /// participation views. Returns the view name.
    ///
    /// Scores land on [-5, 5]: participation from raw participations,
    /// assignment from 2*time_on_time + time_late, grade from the
    /// share of points earned on assignments due by the end of the
    /// week, each normalized per course against the course min/max.
    pub async fn create_rad_view(
        &self,
        term: &term::Model,
        week: &week::Model,
    ) -> Result<String, ViewError> {
        let (sis_term_id, first_day) = Self::term_ids(term)?;
        let view_name = calendar::view_name(&sis_term_id, week.week as u32, "rad")?;
        let assignments_view = calendar::view_name(&sis_term_id, week.week as u32, "assignments")?;
        let participations_view =
            calendar::view_name(&sis_term_id, week.week as u32, "participations")?;
        let week_end = week_end_date(first_day, week.week);

        let body = format!(
            r#"WITH
            avg_norm_ap AS (
                SELECT
                    norm_ap.user_id,
                    AVG(normalized_assignment_score) AS assignment_score,
                    AVG(normalized_participation_score) AS participation_score
                FROM (
                    SELECT
                        p1.user_id,
                        p1.course_id,
                        p1.week_id,
                        CASE
                            WHEN (p1.participations IS NULL OR raw_ap_bounds.min_raw_participation_score IS NULL OR raw_ap_bounds.max_raw_participation_score IS NULL) THEN NULL
                            ELSE ((p1.participations - min_raw_participation_score) * 10.0) / NULLIF(max_raw_participation_score - min_raw_participation_score, 0) - 5
                        END AS normalized_participation_score,
                        CASE
                            WHEN (p1.time_on_time IS NULL OR p1.time_late IS NULL OR raw_ap_bounds.min_raw_assignment_score IS NULL OR raw_ap_bounds.max_raw_assignment_score IS NULL) THEN NULL
                            ELSE ((COALESCE(2 * p1.time_on_time + p1.time_late, 0) - min_raw_assignment_score) * 10.0) / NULLIF(max_raw_assignment_score - min_raw_assignment_score, 0) - 5
                        END AS normalized_assignment_score
                    FROM "{participations_view}" p1
                    JOIN (
                        SELECT
                            course_id,
                            MIN(p2.participations) AS min_raw_participation_score,
                            MAX(p2.participations) AS max_raw_participation_score,
                            MIN(2 * p2.time_on_time + p2.time_late) AS min_raw_assignment_score,
                            MAX(2 * p2.time_on_time + p2.time_late) AS max_raw_assignment_score
                        FROM "{participations_view}" p2
                        GROUP BY
                            course_id
                    ) raw_ap_bounds ON p1.course_id = raw_ap_bounds.course_id
                    GROUP BY
                        p1.user_id,
                        p1.course_id,
                        p1.week_id,
                        participations,
                        p1.time_on_time,
                        p1.time_late,
                        normalized_participation_score,
                        normalized_assignment_score
                ) AS norm_ap
                GROUP BY
                    norm_ap.user_id
            ),
            avg_norm_gr AS (
                WITH scores AS (
                    SELECT a1.course_id,
                        user_id,
                        points_possible,
                        CASE
                            WHEN a1.status = 'missing' AND score IS NULL THEN 0.0
                            WHEN a1.status = 'late' AND score IS NULL THEN 0.0
                            WHEN a1.status = 'on_time' AND score IS NULL THEN 0.0
                            WHEN points_possible = 0 AND score IS NULL THEN 0.0
                            ELSE score
                        END AS new_score
                    FROM "{assignments_view}" a1 JOIN courses c ON
                        a1.course_id = c.id
                    WHERE (due_at IS NOT NULL AND due_at <= '{week_end}'
                           AND c.status = 'active' AND a1.status <> 'floating')
                ),
                user_total_scores AS (
                    SELECT course_id,
                            user_id,
                            SUM(new_score) AS total_score,
                            SUM(points_possible) AS total_points_possible
                    FROM scores
                    GROUP BY course_id, user_id
                ),
                user_percentages AS (
                    SELECT course_id,
                            user_id,
                            CASE
                                WHEN total_score = 0 AND total_points_possible = 0 THEN 0.0
                                WHEN total_score > 0 AND total_points_possible = 0 THEN 1.0
                                ELSE total_score / total_points_possible
                            END AS user_course_percentage
                    FROM user_total_scores uts
                    GROUP BY course_id, user_id, total_score, total_points_possible
                ),
                course_percentages AS (
                    SELECT
                        course_id,
                        MIN(user_percentages.user_course_percentage) AS min_user_course_percentage,
                        MAX(user_percentages.user_course_percentage) AS max_user_course_percentage
                    FROM user_percentages
                    GROUP BY course_id
                ),
                norm_user_course_percentages AS (
                    SELECT
                        cp.course_id,
                        up.user_id,
                        CASE
                            WHEN up.user_course_percentage IS NULL OR cp.min_user_course_percentage IS NULL OR
                                cp.max_user_course_percentage IS NULL THEN NULL
                            WHEN (cp.max_user_course_percentage - cp.min_user_course_percentage) = 0 THEN 0
                            ELSE (up.user_course_percentage - cp.min_user_course_percentage) * 10.0 /
                            (cp.max_user_course_percentage - cp.min_user_course_percentage) - 5
                        END AS normalized_user_course_percentage
                    FROM user_percentages up
                        LEFT JOIN course_percentages cp ON up.course_id = cp.course_id
                    GROUP BY cp.course_id, up.user_id, normalized_user_course_percentage
                )
                SELECT nucp.user_id,
                    AVG(nucp.normalized_user_course_percentage) AS grade
                FROM norm_user_course_percentages nucp JOIN users ON nucp.user_id = users.id
                GROUP BY nucp.user_id, users.login_id
            )
            SELECT DISTINCT
                u.canvas_user_id,
                u.full_name,
                '{term}' AS term,
                {week} AS week,
                assignment_score,
                participation_score,
                grade
            FROM avg_norm_ap
            JOIN avg_norm_gr ON avg_norm_ap.user_id = avg_norm_gr.user_id
            JOIN users u ON avg_norm_ap.user_id = u.id"#,
            participations_view = participations_view,
            assignments_view = assignments_view,
            week_end = week_end.format("%Y-%m-%d"),
            term = sis_term_id,
            week = week.week,
        );
        self.create_view(&view_name, &body).await?;
        Ok(view_name)
    }

    /// Reads the RAD view rows for an export.
    pub async fn fetch_rad_rows(&self, view_name: &str) -> Result<Vec<RadViewRow>, ViewError> {
        let backend = self.db.get_database_backend();
        let rows = self
            .db
            .query_all(Statement::from_string(
                backend,
                format!(
                    "SELECT canvas_user_id, full_name, assignment_score, \
                     participation_score, grade FROM \"{}\"",
                    view_name
                ),
            ))
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(RadViewRow {
                canvas_user_id: row.try_get("", "canvas_user_id")?,
                full_name: row.try_get("", "full_name")?,
                assignment_score: row.try_get("", "assignment_score")?,
                participation_score: row.try_get("", "participation_score")?,
                grade: row.try_get("", "grade")?,
            });
        }
        Ok(out)
    }
}

/// Last calendar day of a term week: the day before the start of the
/// following week.
pub fn week_end_date(first_day_quarter: NaiveDate, week: i32) -> NaiveDate {
    let days = (7 * week.max(1) as u64).saturating_sub(1);
    first_day_quarter
        .checked_add_days(Days::new(days))
        .unwrap_or(first_day_quarter)
}
