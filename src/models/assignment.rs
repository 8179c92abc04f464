//! Assignment entity model
//!
//! Weekly per-student assignment analytics snapshot, unique per
//! (user, course, assignment, week).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "assignments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub job_id: i32,

    pub week_id: i32,

    pub course_id: i32,

    pub user_id: i32,

    pub assignment_id: Option<i64>,

    pub title: Option<String>,

    pub unlock_at: Option<DateTimeWithTimeZone>,

    pub points_possible: Option<f64>,

    pub non_digital_submission: Option<bool>,

    pub due_at: Option<DateTimeWithTimeZone>,

    /// Submission status: on_time, late, missing, or floating
    pub status: Option<String>,

    pub muted: Option<bool>,

    pub min_score: Option<f64>,

    pub max_score: Option<f64>,

    pub first_quartile: Option<i32>,

    pub median: Option<i32>,

    pub third_quartile: Option<i32>,

    pub excused: Option<bool>,

    pub score: Option<f64>,

    pub posted_at: Option<DateTimeWithTimeZone>,

    pub submitted_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::job::Entity",
        from = "Column::JobId",
        to = "super::job::Column::Id"
    )]
    Job,
    #[sea_orm(
        belongs_to = "super::week::Entity",
        from = "Column::WeekId",
        to = "super::week::Column::Id"
    )]
    Week,
    #[sea_orm(
        belongs_to = "super::course::Entity",
        from = "Column::CourseId",
        to = "super::course::Column::Id"
    )]
    Course,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Job.def()
    }
}

impl Related<super::week::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Week.def()
    }
}

impl Related<super::course::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Course.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
