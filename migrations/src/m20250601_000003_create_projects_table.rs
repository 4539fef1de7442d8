use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create projects table
        manager
            .create_table(
                Table::create()
                    .table(Projects::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Projects::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Projects::QuoteId).uuid().not_null())
                    .col(ColumnDef::new(Projects::Name).string().not_null())
                    .col(ColumnDef::new(Projects::Address).text().not_null())
                    .col(ColumnDef::new(Projects::CustomerName).string().not_null())
                    .col(ColumnDef::new(Projects::CustomerEmail).string().not_null())
                    .col(ColumnDef::new(Projects::Budget).decimal().not_null())
                    .col(
                        ColumnDef::new(Projects::Status)
                            .string()
                            .not_null()
                            .default("planning"),
                    )
                    .col(ColumnDef::new(Projects::StartDate).date_time().not_null())
                    .col(ColumnDef::new(Projects::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Projects::UpdatedAt).timestamp().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_projects_quote_id")
                            .from(Projects::Table, Projects::QuoteId)
                            .to(
                                super::m20250601_000001_create_quotes_table::Quotes::Table,
                                super::m20250601_000001_create_quotes_table::Quotes::Id,
                            )
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One project per accepted quote; the unique index is the
        // idempotency anchor for acceptance
        manager
            .create_index(
                Index::create()
                    .name("idx_projects_quote_id")
                    .table(Projects::Table)
                    .col(Projects::QuoteId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Projects {
    Table,
    Id,
    QuoteId,
    Name,
    Address,
    CustomerName,
    CustomerEmail,
    Budget,
    Status,
    StartDate,
    CreatedAt,
    UpdatedAt,
}
