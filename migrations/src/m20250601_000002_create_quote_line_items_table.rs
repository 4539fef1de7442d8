use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create quote_line_items table
        manager
            .create_table(
                Table::create()
                    .table(QuoteLineItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QuoteLineItems::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(QuoteLineItems::QuoteId).uuid().not_null())
                    .col(ColumnDef::new(QuoteLineItems::Category).string().not_null())
                    .col(ColumnDef::new(QuoteLineItems::Description).text().null())
                    .col(ColumnDef::new(QuoteLineItems::Quantity).decimal().not_null())
                    .col(
                        ColumnDef::new(QuoteLineItems::UnitPrice)
                            .decimal()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(QuoteLineItems::LineTotal)
                            .decimal()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(QuoteLineItems::Position)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(QuoteLineItems::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_quote_line_items_quote_id")
                            .from(QuoteLineItems::Table, QuoteLineItems::QuoteId)
                            .to(
                                super::m20250601_000001_create_quotes_table::Quotes::Table,
                                super::m20250601_000001_create_quotes_table::Quotes::Id,
                            )
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_quote_line_items_quote_id")
                    .table(QuoteLineItems::Table)
                    .col(QuoteLineItems::QuoteId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(QuoteLineItems::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum QuoteLineItems {
    Table,
    Id,
    QuoteId,
    Category,
    Description,
    Quantity,
    UnitPrice,
    LineTotal,
    Position,
    CreatedAt,
}
