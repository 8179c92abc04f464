//! Migration to create the users table.
//!
//! One row per LMS user, keyed by the canvas user id.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Users::CanvasUserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Users::LoginId).text().null())
                    .col(ColumnDef::new(Users::SisUserId).text().null())
                    .col(ColumnDef::new(Users::FirstName).text().null())
                    .col(ColumnDef::new(Users::LastName).text().null())
                    .col(ColumnDef::new(Users::FullName).text().null())
                    .col(ColumnDef::new(Users::SortableName).text().null())
                    .col(ColumnDef::new(Users::Email).text().null())
                    .col(ColumnDef::new(Users::Status).text().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uniq_users_canvas_user_id")
                    .table(Users::Table)
                    .col(Users::CanvasUserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // login_id is the join key for the metadata CSVs
        manager
            .create_index(
                Index::create()
                    .name("idx_users_login_id")
                    .table(Users::Table)
                    .col(Users::LoginId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("uniq_users_canvas_user_id").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_users_login_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    CanvasUserId,
    LoginId,
    SisUserId,
    FirstName,
    LastName,
    FullName,
    SortableName,
    Email,
    Status,
}
