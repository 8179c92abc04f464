//! Job entity model
//!
//! A unit of analytics collection targeted at a date window. Lifecycle
//! status is derived from the raw claim/start/end/message fields, never
//! stored; see the job repository for the derivation.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub job_type_id: i32,

    /// Start of the window in which the job may be claimed
    pub target_date_start: DateTimeWithTimeZone,

    /// End of the window; past this the job is expired
    pub target_date_end: DateTimeWithTimeZone,

    /// Collector context: canvas_course_id, sis_term_id, week
    #[sea_orm(column_type = "Json")]
    pub context: JsonValue,

    /// OS process id of the worker that claimed the job
    pub pid: Option<i32>,

    /// Timestamp the worker began running the job
    pub start: Option<DateTimeWithTimeZone>,

    /// Timestamp the worker finished the job
    pub end: Option<DateTimeWithTimeZone>,

    /// Failure message; non-empty means the job failed
    pub message: String,

    pub created: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::job_type::Entity",
        from = "Column::JobTypeId",
        to = "super::job_type::Column::Id"
    )]
    JobType,
}

impl Related<super::job_type::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::JobType.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
