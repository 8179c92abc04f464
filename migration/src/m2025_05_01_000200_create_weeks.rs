//! Migration to create the weeks table.
//!
//! A week is a 1-based offset into a term; analytics rows hang off a
//! (term, week) pair so a given week of a given term is unique.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Weeks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Weeks::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Weeks::TermId).integer().not_null())
                    .col(ColumnDef::new(Weeks::Week).integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_weeks_term_id")
                            .from(Weeks::Table, Weeks::TermId)
                            .to(Terms::Table, Terms::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uniq_weeks_term_week")
                    .table(Weeks::Table)
                    .col(Weeks::TermId)
                    .col(Weeks::Week)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("uniq_weeks_term_week").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Weeks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Weeks {
    Table,
    Id,
    TermId,
    Week,
}

#[derive(DeriveIden)]
enum Terms {
    Table,
    Id,
}
