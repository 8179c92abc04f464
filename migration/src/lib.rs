//! Database migrations for the RAD aggregator.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_05_01_000100_create_terms;
mod m2025_05_01_000200_create_weeks;
mod m2025_05_01_000300_create_courses;
mod m2025_05_01_000400_create_users;
mod m2025_05_01_000500_create_job_types;
mod m2025_05_01_000600_create_jobs;
mod m2025_05_01_000700_create_assignments;
mod m2025_05_01_000800_create_participations;
mod m2025_05_01_000900_create_reports;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_05_01_000100_create_terms::Migration),
            Box::new(m2025_05_01_000200_create_weeks::Migration),
            Box::new(m2025_05_01_000300_create_courses::Migration),
            Box::new(m2025_05_01_000400_create_users::Migration),
            Box::new(m2025_05_01_000500_create_job_types::Migration),
            Box::new(m2025_05_01_000600_create_jobs::Migration),
            Box::new(m2025_05_01_000700_create_assignments::Migration),
            Box::new(m2025_05_01_000800_create_participations::Migration),
            Box::new(m2025_05_01_000900_create_reports::Migration),
        ]
    }
}
