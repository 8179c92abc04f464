//! Migration to create the courses table.
//!
//! Courses come from the LMS provisioning report; the same canvas
//! course may reappear across terms, so uniqueness is per term.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Courses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Courses::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Courses::CanvasCourseId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Courses::SisCourseId).text().null())
                    .col(ColumnDef::new(Courses::ShortName).text().null())
                    .col(ColumnDef::new(Courses::LongName).text().null())
                    .col(ColumnDef::new(Courses::CanvasAccountId).big_integer().null())
                    .col(ColumnDef::new(Courses::SisAccountId).text().null())
                    .col(ColumnDef::new(Courses::Status).text().null())
                    .col(ColumnDef::new(Courses::TermId).integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_courses_term_id")
                            .from(Courses::Table, Courses::TermId)
                            .to(Terms::Table, Terms::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uniq_courses_canvas_course_term")
                    .table(Courses::Table)
                    .col(Courses::CanvasCourseId)
                    .col(Courses::TermId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("uniq_courses_canvas_course_term")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Courses::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Courses {
    Table,
    Id,
    CanvasCourseId,
    SisCourseId,
    ShortName,
    LongName,
    CanvasAccountId,
    SisAccountId,
    Status,
    TermId,
}

#[derive(DeriveIden)]
enum Terms {
    Table,
    Id,
}
