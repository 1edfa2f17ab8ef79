use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ClassSessions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ClassSessions::Id).text().not_null().primary_key())
                    .col(ColumnDef::new(ClassSessions::TeamId).text().null())
                    .col(ColumnDef::new(ClassSessions::CoachIds).json().not_null())
                    .col(
                        ColumnDef::new(ClassSessions::StartAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClassSessions::EndAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClassSessions::Location).text().null())
                    .col(ColumnDef::new(ClassSessions::Capacity).integer().not_null())
                    .col(
                        ColumnDef::new(ClassSessions::EnrolledCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ClassSessions::Status).string_len(16).not_null())
                    .col(
                        ColumnDef::new(ClassSessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .check(Expr::col(ClassSessions::EnrolledCount).gte(0))
                    .check(
                        Expr::col(ClassSessions::EnrolledCount)
                            .lte(Expr::col(ClassSessions::Capacity)),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Enrollments::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Enrollments::SessionId).text().not_null())
                    .col(ColumnDef::new(Enrollments::MemberId).text().not_null())
                    .col(ColumnDef::new(Enrollments::Status).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Enrollments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(Enrollments::SessionId)
                            .col(Enrollments::MemberId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_enrollments_session")
                            .from(Enrollments::Table, Enrollments::SessionId)
                            .to(ClassSessions::Table, ClassSessions::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_enrollments_member")
                    .table(Enrollments::Table)
                    .col(Enrollments::MemberId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Members::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Members::Id).text().not_null().primary_key())
                    .col(ColumnDef::new(Members::Name).text().not_null())
                    .col(ColumnDef::new(Members::Status).text().not_null())
                    .col(
                        ColumnDef::new(Members::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MemberPlans::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(MemberPlans::Id).text().not_null().primary_key())
                    .col(ColumnDef::new(MemberPlans::MemberId).text().not_null())
                    .col(ColumnDef::new(MemberPlans::PlanType).string_len(16).not_null())
                    .col(ColumnDef::new(MemberPlans::Name).text().not_null())
                    .col(ColumnDef::new(MemberPlans::TotalCredits).integer().null())
                    .col(ColumnDef::new(MemberPlans::RemainingCredits).integer().not_null())
                    .col(
                        ColumnDef::new(MemberPlans::ValidFrom)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MemberPlans::ValidUntil)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(MemberPlans::Status).string_len(16).not_null())
                    .col(
                        ColumnDef::new(MemberPlans::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MemberPlans::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .check(Expr::col(MemberPlans::RemainingCredits).gte(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_member_plans_member")
                            .from(MemberPlans::Table, MemberPlans::MemberId)
                            .to(Members::Table, Members::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_member_plans_member_status")
                    .table(MemberPlans::Table)
                    .col(MemberPlans::MemberId)
                    .col(MemberPlans::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AuditLogs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AuditLogs::Id).text().not_null().primary_key())
                    .col(ColumnDef::new(AuditLogs::ActorUserId).text().not_null())
                    .col(ColumnDef::new(AuditLogs::Action).text().not_null())
                    .col(ColumnDef::new(AuditLogs::TargetType).text().not_null())
                    .col(ColumnDef::new(AuditLogs::TargetId).text().not_null())
                    .col(ColumnDef::new(AuditLogs::Payload).binary().null())
                    .col(
                        ColumnDef::new(AuditLogs::At)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AuditLogs::Ip).text().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_logs_at")
                    .table(AuditLogs::Table)
                    .col(AuditLogs::At)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuditLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MemberPlans::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Members::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Enrollments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ClassSessions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ClassSessions {
    Table,
    Id,
    TeamId,
    CoachIds,
    StartAt,
    EndAt,
    Location,
    Capacity,
    EnrolledCount,
    Status,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Enrollments {
    Table,
    SessionId,
    MemberId,
    Status,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Members {
    Table,
    Id,
    Name,
    Status,
    CreatedAt,
}

#[derive(DeriveIden)]
enum MemberPlans {
    Table,
    Id,
    MemberId,
    PlanType,
    Name,
    TotalCredits,
    RemainingCredits,
    ValidFrom,
    ValidUntil,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AuditLogs {
    Table,
    Id,
    ActorUserId,
    Action,
    TargetType,
    TargetId,
    Payload,
    At,
    Ip,
}
