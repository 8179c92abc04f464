//! Job type seeding functionality
//!
//! Seeds the job_types table with the assignment and participation
//! discriminators the collectors dispatch on.

use anyhow::Result;
use sea_orm::DatabaseConnection;

use crate::collectors::CollectorKind;
use crate::repositories::JobTypeRepository;

/// Seeds the job_types table with the collector discriminators.
///
/// Existing rows are left untouched, so this is safe to run on every
/// startup.
pub async fn seed_job_types(db: &DatabaseConnection) -> Result<()> {
    let repo = JobTypeRepository::new(db.clone());

    for kind in [CollectorKind::Assignment, CollectorKind::Participation] {
        let job_type = repo.get_or_create(kind.job_type()).await?;
        tracing::debug!(job_type = job_type.job_type, "job type present");
    }

    tracing::info!("job type seeding complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::MigratorTrait;

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();

        seed_job_types(&db).await.unwrap();
        seed_job_types(&db).await.unwrap();

        let repo = JobTypeRepository::new(db.clone());
        assert!(repo.find_by_name("assignment").await.unwrap().is_some());
        assert!(repo.find_by_name("participation").await.unwrap().is_some());
    }
}
