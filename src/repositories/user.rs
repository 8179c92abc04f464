//! # User Repository
//!
//! Upserts users from the provisioning report and resolves canvas user
//! ids to local row ids for the collectors.

use std::collections::HashMap;

use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::models::user::{ActiveModel, Column, Entity, Model};

/// A user row parsed from the provisioning report.
#[derive(Debug, Clone)]
pub struct UserUpsert {
    pub canvas_user_id: i64,
    pub login_id: Option<String>,
    pub sis_user_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub sortable_name: Option<String>,
    pub email: Option<String>,
    pub status: Option<String>,
}

/// Repository for user database operations
pub struct UserRepository {
    db: DatabaseConnection,
}

impl UserRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts or refreshes users keyed on canvas_user_id. Returns the
    /// number of rows written.
    pub async fn upsert_batch(&self, users: Vec<UserUpsert>) -> Result<usize, sea_orm::DbErr> {
        if users.is_empty() {
            return Ok(0);
        }
        let count = users.len();
        let rows: Vec<ActiveModel> = users
            .into_iter()
            .map(|u| ActiveModel {
                canvas_user_id: Set(u.canvas_user_id),
                login_id: Set(u.login_id),
                sis_user_id: Set(u.sis_user_id),
                first_name: Set(u.first_name),
                last_name: Set(u.last_name),
                full_name: Set(u.full_name),
                sortable_name: Set(u.sortable_name),
                email: Set(u.email),
                status: Set(u.status),
                ..Default::default()
            })
            .collect();

        Entity::insert_many(rows)
            .on_conflict(
                OnConflict::column(Column::CanvasUserId)
                    .update_columns([
                        Column::LoginId,
                        Column::SisUserId,
                        Column::FirstName,
                        Column::LastName,
                        Column::FullName,
                        Column::SortableName,
                        Column::Email,
                        Column::Status,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(count)
    }

    /// Maps canvas user ids to local row ids. Ids with no user row are
    /// absent from the map.
    pub async fn find_ids_by_canvas_ids(
        &self,
        canvas_user_ids: &[i64],
    ) -> Result<HashMap<i64, i32>, sea_orm::DbErr> {
        if canvas_user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = Entity::find()
            .filter(Column::CanvasUserId.is_in(canvas_user_ids.iter().copied()))
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|u| (u.canvas_user_id, u.id))
            .collect())
    }

    pub async fn find_by_canvas_user_id(
        &self,
        canvas_user_id: i64,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::CanvasUserId.eq(canvas_user_id))
            .one(&self.db)
            .await
    }
}
