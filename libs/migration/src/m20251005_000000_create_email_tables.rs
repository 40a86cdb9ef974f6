use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Delivery log, one row per send attempt
        manager
            .create_table(
                Table::create()
                    .table(EmailLogs::Table)
                    .if_not_exists()
                    .col(pk_uuid(EmailLogs::Id))
                    .col(json_binary(EmailLogs::ToAddresses))
                    .col(json_binary(EmailLogs::CcAddresses).default(Expr::cust("'[]'::jsonb")))
                    .col(
                        ColumnDef::new(EmailLogs::Subject)
                            .string_len(998)
                            .not_null(),
                    )
                    .col(text_null(EmailLogs::Html))
                    .col(text_null(EmailLogs::Text))
                    .col(ColumnDef::new(EmailLogs::TemplateId).string_len(64).null())
                    .col(json_binary_null(EmailLogs::TemplateVariables))
                    .col(
                        ColumnDef::new(EmailLogs::Priority)
                            .string_len(16)
                            .not_null()
                            .default("medium"),
                    )
                    .col(
                        ColumnDef::new(EmailLogs::PriorityRank)
                            .small_integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(EmailLogs::TriggerCategory)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(EmailLogs::RelatedEntityId).string_len(255).null())
                    .col(ColumnDef::new(EmailLogs::UserId).string_len(255).null())
                    .col(
                        ColumnDef::new(EmailLogs::Status)
                            .string_len(32)
                            .not_null()
                            .default("queued"),
                    )
                    .col(
                        ColumnDef::new(EmailLogs::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(EmailLogs::ProviderMessageId).string_len(255).null())
                    .col(text_null(EmailLogs::LastError))
                    .col(
                        timestamp_with_time_zone(EmailLogs::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(EmailLogs::SentAt))
                    .col(
                        timestamp_with_time_zone(EmailLogs::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    // Set while a drain holds the row; expired claims are free again
                    .col(timestamp_with_time_zone_null(EmailLogs::ClaimedUntil))
                    .to_owned(),
            )
            .await?;

        // Operator-editable settings, one row per key
        manager
            .create_table(
                Table::create()
                    .table(EmailSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailSettings::Key)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(text(EmailSettings::Value))
                    .col(
                        timestamp_with_time_zone(EmailSettings::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Queue drain reads queued rows by priority then age
        manager
            .create_index(
                Index::create()
                    .name("idx_email_logs_drain")
                    .table(EmailLogs::Table)
                    .col(EmailLogs::Status)
                    .col(EmailLogs::PriorityRank)
                    .col(EmailLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_logs_trigger_category")
                    .table(EmailLogs::Table)
                    .col(EmailLogs::TriggerCategory)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_logs_user_id")
                    .table(EmailLogs::Table)
                    .col(EmailLogs::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_logs_status_updated_at")
                    .table(EmailLogs::Table)
                    .col(EmailLogs::Status)
                    .col(EmailLogs::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        // Defaults matching a fresh install: sending off until an operator enables it
        manager
            .exec_stmt(
                Query::insert()
                    .into_table(EmailSettings::Table)
                    .columns([EmailSettings::Key, EmailSettings::Value])
                    .values_panic(["global_enable".into(), "false".into()])
                    .values_panic(["from_email".into(), "info@symbolai.net".into()])
                    .values_panic(["from_name".into(), "SymbolAI".into()])
                    .values_panic(["reply_to".into(), "no-reply@symbolai.net".into()])
                    .values_panic(["rate_limit_global_hourly".into(), "100".into()])
                    .values_panic(["rate_limit_global_daily".into(), "500".into()])
                    .values_panic(["rate_limit_user_hourly".into(), "10".into()])
                    .values_panic(["rate_limit_user_daily".into(), "30".into()])
                    .on_conflict(OnConflict::column(EmailSettings::Key).do_nothing().to_owned())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailSettings::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(EmailLogs::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum EmailLogs {
    Table,
    Id,
    ToAddresses,
    CcAddresses,
    Subject,
    Html,
    Text,
    TemplateId,
    TemplateVariables,
    Priority,
    PriorityRank,
    TriggerCategory,
    RelatedEntityId,
    UserId,
    Status,
    RetryCount,
    ProviderMessageId,
    LastError,
    CreatedAt,
    SentAt,
    UpdatedAt,
    ClaimedUntil,
}

#[derive(DeriveIden)]
enum EmailSettings {
    Table,
    Key,
    Value,
    UpdatedAt,
}
