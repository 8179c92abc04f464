//! # JobType Repository

use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::models::job_type::{ActiveModel, Column, Entity, Model};

/// Repository for job type database operations
pub struct JobTypeRepository {
    db: DatabaseConnection,
}

impl JobTypeRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_name(&self, job_type: &str) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::JobType.eq(job_type))
            .one(&self.db)
            .await
    }

    /// Finds or creates a job type row by its discriminator.
    pub async fn get_or_create(&self, job_type: &str) -> Result<Model, sea_orm::DbErr> {
        if let Some(existing) = self.find_by_name(job_type).await? {
            return Ok(existing);
        }
        let row = ActiveModel {
            job_type: Set(job_type.to_string()),
            ..Default::default()
        };
        row.insert(&self.db).await
    }
}
