//! Migration to create the terms table.
//!
//! Terms mirror the academic quarter calendar pulled from the student
//! web service; one row per (year, quarter) with the key dates used
//! for week arithmetic and current-term resolution.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Terms::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Terms::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Terms::CanvasTermId).big_integer().null())
                    .col(ColumnDef::new(Terms::SisTermId).text().null())
                    .col(ColumnDef::new(Terms::Year).integer().null())
                    .col(ColumnDef::new(Terms::Quarter).text().null())
                    .col(ColumnDef::new(Terms::Label).text().null())
                    .col(ColumnDef::new(Terms::LastDayAdd).date().null())
                    .col(ColumnDef::new(Terms::LastDayDrop).date().null())
                    .col(ColumnDef::new(Terms::FirstDayQuarter).date().null())
                    .col(ColumnDef::new(Terms::CensusDay).date().null())
                    .col(ColumnDef::new(Terms::LastDayInstruction).date().null())
                    .col(
                        ColumnDef::new(Terms::GradingPeriodOpen)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Terms::ATermGradingPeriodOpen)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Terms::GradeSubmissionDeadline)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Terms::LastFinalExamDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uniq_terms_canvas_term_id")
                    .table(Terms::Table)
                    .col(Terms::CanvasTermId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uniq_terms_sis_term_id")
                    .table(Terms::Table)
                    .col(Terms::SisTermId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("uniq_terms_canvas_term_id").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("uniq_terms_sis_term_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Terms::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Terms {
    Table,
    Id,
    CanvasTermId,
    SisTermId,
    Year,
    Quarter,
    Label,
    LastDayAdd,
    LastDayDrop,
    FirstDayQuarter,
    CensusDay,
    LastDayInstruction,
    GradingPeriodOpen,
    #[sea_orm(iden = "aterm_grading_period_open")]
    ATermGradingPeriodOpen,
    GradeSubmissionDeadline,
    LastFinalExamDate,
}
