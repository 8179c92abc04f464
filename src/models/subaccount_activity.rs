//! SubaccountActivity entity model
//!
//! Per-subaccount activity counters recorded by the subaccount
//! activity report.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "subaccount_activities")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub report_id: i32,

    pub term_id: String,

    pub subaccount_id: String,

    pub subaccount_name: String,

    pub courses: i32,
    pub active_courses: i32,
    pub ind_study_courses: i32,
    pub active_ind_study_courses: i32,
    pub xlist_courses: i32,
    pub xlist_ind_study_courses: i32,
    pub teachers: i32,
    pub unique_teachers: i32,
    pub students: i32,
    pub unique_students: i32,
    pub discussion_topics: i32,
    pub discussion_replies: i32,
    pub media_objects: i32,
    pub attachments: i32,
    pub assignments: i32,
    pub submissions: i32,
    pub announcements_views: i32,
    pub assignments_views: i32,
    pub collaborations_views: i32,
    pub conferences_views: i32,
    pub discussions_views: i32,
    pub files_views: i32,
    pub general_views: i32,
    pub grades_views: i32,
    pub groups_views: i32,
    pub modules_views: i32,
    pub other_views: i32,
    pub pages_views: i32,
    pub quizzes_views: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::report::Entity",
        from = "Column::ReportId",
        to = "super::report::Column::Id"
    )]
    Report,
}

impl Related<super::report::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Report.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
