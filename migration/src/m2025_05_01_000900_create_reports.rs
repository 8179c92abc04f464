//! Migration to create the reports and subaccount_activities tables.
//!
//! A report row tracks one run of an account-level report; the
//! subaccount activity counters hang off it one row per subaccount.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Reports::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Reports::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Reports::ReportType).text().not_null())
                    .col(
                        ColumnDef::new(Reports::StartedDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Reports::FinishedDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Reports::TermId).text().not_null())
                    .col(ColumnDef::new(Reports::TermWeek).integer().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SubaccountActivities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SubaccountActivities::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SubaccountActivities::ReportId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SubaccountActivities::TermId).text().not_null())
                    .col(
                        ColumnDef::new(SubaccountActivities::SubaccountId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubaccountActivities::SubaccountName)
                            .text()
                            .not_null(),
                    )
                    .col(counter(SubaccountActivities::Courses))
                    .col(counter(SubaccountActivities::ActiveCourses))
                    .col(counter(SubaccountActivities::IndStudyCourses))
                    .col(counter(SubaccountActivities::ActiveIndStudyCourses))
                    .col(counter(SubaccountActivities::XlistCourses))
                    .col(counter(SubaccountActivities::XlistIndStudyCourses))
                    .col(counter(SubaccountActivities::Teachers))
                    .col(counter(SubaccountActivities::UniqueTeachers))
                    .col(counter(SubaccountActivities::Students))
                    .col(counter(SubaccountActivities::UniqueStudents))
                    .col(counter(SubaccountActivities::DiscussionTopics))
                    .col(counter(SubaccountActivities::DiscussionReplies))
                    .col(counter(SubaccountActivities::MediaObjects))
                    .col(counter(SubaccountActivities::Attachments))
                    .col(counter(SubaccountActivities::Assignments))
                    .col(counter(SubaccountActivities::Submissions))
                    .col(counter(SubaccountActivities::AnnouncementsViews))
                    .col(counter(SubaccountActivities::AssignmentsViews))
                    .col(counter(SubaccountActivities::CollaborationsViews))
                    .col(counter(SubaccountActivities::ConferencesViews))
                    .col(counter(SubaccountActivities::DiscussionsViews))
                    .col(counter(SubaccountActivities::FilesViews))
                    .col(counter(SubaccountActivities::GeneralViews))
                    .col(counter(SubaccountActivities::GradesViews))
                    .col(counter(SubaccountActivities::GroupsViews))
                    .col(counter(SubaccountActivities::ModulesViews))
                    .col(counter(SubaccountActivities::OtherViews))
                    .col(counter(SubaccountActivities::PagesViews))
                    .col(counter(SubaccountActivities::QuizzesViews))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_subaccount_activities_report_id")
                            .from(SubaccountActivities::Table, SubaccountActivities::ReportId)
                            .to(Reports::Table, Reports::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_subaccount_activities_term_subaccount")
                    .table(SubaccountActivities::Table)
                    .col(SubaccountActivities::TermId)
                    .col(SubaccountActivities::SubaccountId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_subaccount_activities_term_subaccount")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(SubaccountActivities::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Reports::Table).to_owned())
            .await
    }
}

fn counter(name: SubaccountActivities) -> ColumnDef {
    let mut col = ColumnDef::new(name);
    col.integer().not_null().default(0);
    col
}

#[derive(DeriveIden)]
enum Reports {
    Table,
    Id,
    ReportType,
    StartedDate,
    FinishedDate,
    TermId,
    TermWeek,
}

#[derive(DeriveIden)]
enum SubaccountActivities {
    Table,
    Id,
    ReportId,
    TermId,
    SubaccountId,
    SubaccountName,
    Courses,
    ActiveCourses,
    IndStudyCourses,
    ActiveIndStudyCourses,
    XlistCourses,
    XlistIndStudyCourses,
    Teachers,
    UniqueTeachers,
    Students,
    UniqueStudents,
    DiscussionTopics,
    DiscussionReplies,
    MediaObjects,
    Attachments,
    Assignments,
    Submissions,
    AnnouncementsViews,
    AssignmentsViews,
    CollaborationsViews,
    ConferencesViews,
    DiscussionsViews,
    FilesViews,
    GeneralViews,
    GradesViews,
    GroupsViews,
    ModulesViews,
    OtherViews,
    PagesViews,
    QuizzesViews,
}
