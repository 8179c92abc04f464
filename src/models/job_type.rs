//! JobType entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

/// The two analytic job types dispatched by the collectors.
pub const ASSIGNMENT: &str = "assignment";
pub const PARTICIPATION: &str = "participation";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "job_types")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Discriminator: `assignment` or `participation`
    pub job_type: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::job::Entity")]
    Job,
}

impl Related<super::job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Job.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
