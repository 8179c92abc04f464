//! Report entity model
//!
//! Tracks one run of an account-level report.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// The only report type currently produced.
pub const SUBACCOUNT_ACTIVITY: &str = "subaccount_activity";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "reports")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub report_type: String,

    pub started_date: DateTimeWithTimeZone,

    pub finished_date: Option<DateTimeWithTimeZone>,

    /// sis term id the report covers
    pub term_id: String,

    /// Week of term at the time the report ran
    pub term_week: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::subaccount_activity::Entity")]
    SubaccountActivity,
}

impl Related<super::subaccount_activity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SubaccountActivity.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
