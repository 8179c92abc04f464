//! User entity model
//!
//! One row per LMS user, keyed by canvas user id.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub canvas_user_id: i64,

    /// Institutional login (netid); join key for the metadata CSVs
    pub login_id: Option<String>,

    pub sis_user_id: Option<String>,

    pub first_name: Option<String>,

    pub last_name: Option<String>,

    pub full_name: Option<String>,

    pub sortable_name: Option<String>,

    pub email: Option<String>,

    pub status: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
