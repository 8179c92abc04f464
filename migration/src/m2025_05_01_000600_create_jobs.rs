//! Migration to create the jobs table.
//!
//! A job is a unit of analytics collection targeted at a date window.
//! Lifecycle status is never stored; it is derived from (pid, start,
//! end, message, target_date_end), so the table only carries those
//! raw fields plus the json context the collector needs.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Jobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Jobs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Jobs::JobTypeId).integer().not_null())
                    .col(
                        ColumnDef::new(Jobs::TargetDateStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Jobs::TargetDateEnd)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Jobs::Context).json().not_null())
                    .col(ColumnDef::new(Jobs::Pid).integer().null())
                    .col(
                        ColumnDef::new(Jobs::Start)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Jobs::End).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Jobs::Message).text().not_null().default(""))
                    .col(
                        ColumnDef::new(Jobs::Created)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_jobs_job_type_id")
                            .from(Jobs::Table, Jobs::JobTypeId)
                            .to(JobTypes::Table, JobTypes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Claim scans filter on type, pid and the target window; keep
        // created in the index so the claim order is covered too.
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs (job_type_id, pid, target_date_start, target_date_end, created)".to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_jobs_claim").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Jobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
    JobTypeId,
    TargetDateStart,
    TargetDateEnd,
    Context,
    Pid,
    Start,
    End,
    Message,
    Created,
}

#[derive(DeriveIden)]
enum JobTypes {
    Table,
    Id,
}
