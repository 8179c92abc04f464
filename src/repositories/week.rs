//! # Week Repository

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

use crate::models::week::{ActiveModel, Column, Entity, Model};

/// Repository for week database operations
pub struct WeekRepository {
    db: DatabaseConnection,
}

impl WeekRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Finds or creates the (term, week) row.
    pub async fn get_or_create(&self, term_id: i32, week: i32) -> Result<Model, sea_orm::DbErr> {
        if let Some(existing) = Entity::find()
            .filter(Column::TermId.eq(term_id))
            .filter(Column::Week.eq(week))
            .one(&self.db)
            .await?
        {
            return Ok(existing);
        }

        let row = ActiveModel {
            term_id: Set(term_id),
            week: Set(week),
            ..Default::default()
        };
        row.insert(&self.db).await
    }

    pub async fn find(&self, term_id: i32, week: i32) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::TermId.eq(term_id))
            .filter(Column::Week.eq(week))
            .one(&self.db)
            .await
    }
}
