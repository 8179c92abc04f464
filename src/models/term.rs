//! Term entity model
//!
//! One row per academic quarter, carrying the calendar dates used for
//! current-term resolution and week arithmetic.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "terms")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Canvas enrollment term id, when known
    pub canvas_term_id: Option<i64>,

    /// `YYYY-quarter` identifier, e.g. `2021-spring`
    pub sis_term_id: Option<String>,

    pub year: Option<i32>,

    /// Quarter name: winter, spring, summer, or autumn
    pub quarter: Option<String>,

    /// Human-readable label, e.g. `Spring 2021`
    pub label: Option<String>,

    pub last_day_add: Option<Date>,
    pub last_day_drop: Option<Date>,
    pub first_day_quarter: Option<Date>,
    pub census_day: Option<Date>,
    pub last_day_instruction: Option<Date>,
    pub grading_period_open: Option<DateTimeWithTimeZone>,
    pub aterm_grading_period_open: Option<DateTimeWithTimeZone>,
    pub grade_submission_deadline: Option<DateTimeWithTimeZone>,
    pub last_final_exam_date: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::week::Entity")]
    Week,
    #[sea_orm(has_many = "super::course::Entity")]
    Course,
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

impl ActiveModelBehavior for ActiveModel {}
