use sea_orm_migration::{
    prelude::*,
    schema::{boolean, string, string_null, timestamp},
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(JobConfig::Table)
                    .if_not_exists()
                    .col(string(JobConfig::Name).primary_key())
                    .col(string_null(JobConfig::CronExpression))
                    .col(boolean(JobConfig::IsEnabled).default(true))
                    .col(
                        timestamp(JobConfig::CreatedAt)
                            .not_null()
                            .default(Expr::cust("CURRENT_TIMESTAMP")),
                    )
                    .col(
                        timestamp(JobConfig::UpdatedAt)
                            .not_null()
                            .default(Expr::cust("CURRENT_TIMESTAMP")),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobConfig::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum JobConfig {
    Table,
    Name,
    CronExpression,
    IsEnabled,
    CreatedAt,
    UpdatedAt,
}
