//! Migration to create the assignments table.
//!
//! Weekly per-student assignment analytics. Re-running a job upserts
//! on (user, course, assignment, week), so that tuple is unique.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Assignments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Assignments::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Assignments::JobId).integer().not_null())
                    .col(ColumnDef::new(Assignments::WeekId).integer().not_null())
                    .col(ColumnDef::new(Assignments::CourseId).integer().not_null())
                    .col(ColumnDef::new(Assignments::UserId).integer().not_null())
                    .col(
                        ColumnDef::new(Assignments::AssignmentId)
                            .big_integer()
                            .null(),
                    )
                    .col(ColumnDef::new(Assignments::Title).text().null())
                    .col(
                        ColumnDef::new(Assignments::UnlockAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Assignments::PointsPossible).double().null())
                    .col(
                        ColumnDef::new(Assignments::NonDigitalSubmission)
                            .boolean()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Assignments::DueAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Assignments::Status).text().null())
                    .col(ColumnDef::new(Assignments::Muted).boolean().null())
                    .col(ColumnDef::new(Assignments::MinScore).double().null())
                    .col(ColumnDef::new(Assignments::MaxScore).double().null())
                    .col(ColumnDef::new(Assignments::FirstQuartile).integer().null())
                    .col(ColumnDef::new(Assignments::Median).integer().null())
                    .col(ColumnDef::new(Assignments::ThirdQuartile).integer().null())
                    .col(ColumnDef::new(Assignments::Excused).boolean().null())
                    .col(ColumnDef::new(Assignments::Score).double().null())
                    .col(
                        ColumnDef::new(Assignments::PostedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Assignments::SubmittedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_assignments_job_id")
                            .from(Assignments::Table, Assignments::JobId)
                            .to(Jobs::Table, Jobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_assignments_week_id")
                            .from(Assignments::Table, Assignments::WeekId)
                            .to(Weeks::Table, Weeks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_assignments_course_id")
                            .from(Assignments::Table, Assignments::CourseId)
                            .to(Courses::Table, Courses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_assignments_user_id")
                            .from(Assignments::Table, Assignments::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uniq_assignments_user_course_assignment_week")
                    .table(Assignments::Table)
                    .col(Assignments::UserId)
                    .col(Assignments::CourseId)
                    .col(Assignments::AssignmentId)
                    .col(Assignments::WeekId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_assignments_week_course")
                    .table(Assignments::Table)
                    .col(Assignments::WeekId)
                    .col(Assignments::CourseId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("uniq_assignments_user_course_assignment_week")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_assignments_week_course").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Assignments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Assignments {
    Table,
    Id,
    JobId,
    WeekId,
    CourseId,
    UserId,
    AssignmentId,
    Title,
    UnlockAt,
    PointsPossible,
    NonDigitalSubmission,
    DueAt,
    Status,
    Muted,
    MinScore,
    MaxScore,
    FirstQuartile,
    Median,
    ThirdQuartile,
    Excused,
    Score,
    PostedAt,
    SubmittedAt,
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Weeks {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Courses {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
