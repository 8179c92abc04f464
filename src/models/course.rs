//! Course entity model
//!
//! Courses sourced from the LMS provisioning report, unique per
//! (canvas_course_id, term).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "courses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub canvas_course_id: i64,

    pub sis_course_id: Option<String>,

    pub short_name: Option<String>,

    pub long_name: Option<String>,

    pub canvas_account_id: Option<i64>,

    pub sis_account_id: Option<String>,

    /// Provisioning status, e.g. `active`, `deleted`
    pub status: Option<String>,

    pub term_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::term::Entity",
        from = "Column::TermId",
        to = "super::term::Column::Id"
    )]
    Term,
}

impl Related<super::term::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Term.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
