//! Migration to create the participations table.
//!
//! Weekly per-student course participation summaries, one row per
//! (user, course, week).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Participations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Participations::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Participations::JobId).integer().not_null())
                    .col(ColumnDef::new(Participations::WeekId).integer().not_null())
                    .col(
                        ColumnDef::new(Participations::CourseId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Participations::UserId).integer().not_null())
                    .col(ColumnDef::new(Participations::PageViews).integer().null())
                    .col(
                        ColumnDef::new(Participations::MaxPageViews)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Participations::PageViewsLevel)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Participations::Participations)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Participations::MaxParticipations)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Participations::ParticipationsLevel)
                            .integer()
                            .null(),
                    )
                    .col(ColumnDef::new(Participations::TimeTardy).integer().null())
                    .col(ColumnDef::new(Participations::TimeOnTime).integer().null())
                    .col(ColumnDef::new(Participations::TimeLate).integer().null())
                    .col(ColumnDef::new(Participations::TimeMissing).integer().null())
                    .col(
                        ColumnDef::new(Participations::TimeFloating)
                            .integer()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_participations_job_id")
                            .from(Participations::Table, Participations::JobId)
                            .to(Jobs::Table, Jobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_participations_week_id")
                            .from(Participations::Table, Participations::WeekId)
                            .to(Weeks::Table, Weeks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_participations_course_id")
                            .from(Participations::Table, Participations::CourseId)
                            .to(Courses::Table, Courses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_participations_user_id")
                            .from(Participations::Table, Participations::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uniq_participations_user_course_week")
                    .table(Participations::Table)
                    .col(Participations::UserId)
                    .col(Participations::CourseId)
                    .col(Participations::WeekId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_participations_week_course")
                    .table(Participations::Table)
                    .col(Participations::WeekId)
                    .col(Participations::CourseId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("uniq_participations_user_course_week")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_participations_week_course")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Participations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Participations {
    Table,
    Id,
    JobId,
    WeekId,
    CourseId,
    UserId,
    PageViews,
    MaxPageViews,
    PageViewsLevel,
    Participations,
    MaxParticipations,
    ParticipationsLevel,
    TimeTardy,
    TimeOnTime,
    TimeLate,
    TimeMissing,
    TimeFloating,
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
